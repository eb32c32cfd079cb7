pub mod assets;
pub mod bulk;
pub mod health;
