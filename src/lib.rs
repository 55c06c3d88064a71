#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

pub mod api;
pub mod broadcast;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod model;

pub use config::Config;

use rocket::{Build, Rocket};

use crate::broadcast::UpdateChannel;
use crate::config::{ConfigFairing, DatabaseFairing, MailerFairing};
use crate::diagnostics::Diagnostics;
use crate::logging::LoggerFairing;

/// Construct the rocket, ready for ignition.
pub fn build() -> Rocket<Build> {
    build_with_database(DatabaseFairing::new())
}

fn build_with_database(database: DatabaseFairing) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(database)
        .attach(MailerFairing)
        .attach(LoggerFairing)
        .manage(UpdateChannel::new())
        .manage(Diagnostics::new())
}

/// Construct a rocket against a specific named database, so each test can
/// run in its own.
#[cfg(test)]
pub fn build_for_database(db_name: impl Into<String>) -> Rocket<Build> {
    build_with_database(DatabaseFairing::for_database(db_name))
}

/// A random database name, unique per test.
#[cfg(test)]
pub fn test_database_name() -> String {
    format!("test{}", rand::random::<u32>())
}
