mod deploy;
mod doctor;
mod init;
mod plan;
mod status;

pub use deploy::deploy;
pub use doctor::doctor;
pub use init::init_project;
pub use plan::plan;
pub use status::status;
