pub mod server;

use crate::cli::commands::auth;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        options: auth::Options,
    },
}
