pub mod generator;
pub mod locator_model;
