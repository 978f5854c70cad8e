pub mod error;
pub mod node;
pub mod parser;

pub type Program = Vec<node::Node>;
