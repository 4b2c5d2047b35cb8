pub mod delegates;
pub mod endpoints;
pub mod live;
pub mod presence;
pub mod schemas;
pub mod session;
pub mod socket;
