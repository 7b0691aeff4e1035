pub mod coordinator;
pub mod dispatcher;
pub mod input;
pub mod parser;
pub mod safety;
pub mod text_input;
