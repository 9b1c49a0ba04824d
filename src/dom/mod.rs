pub mod dom_model;
pub mod extractor;
pub mod path;
