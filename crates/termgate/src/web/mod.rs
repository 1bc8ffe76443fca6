// WebSocket/REST surface of the broker

pub mod protocol;
pub mod routes;
pub mod server;
