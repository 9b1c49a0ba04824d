pub mod completion;
pub mod heal_model;
pub mod healer;
pub mod prompt;
pub mod response;
