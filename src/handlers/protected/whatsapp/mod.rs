pub mod check_connection;
pub mod create_instance;
pub mod status;
pub mod update_status;

pub use check_connection::check_connection_get;
pub use create_instance::create_instance_post;
pub use status::status_get;
pub use update_status::update_status_post;
