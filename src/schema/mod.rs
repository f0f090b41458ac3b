pub mod operator;
pub mod order;
pub mod story;
pub mod value;
