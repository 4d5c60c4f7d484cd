pub mod apps;
pub mod clusters;
pub mod health;
pub mod logs;
pub mod settings;
pub mod workflows;
