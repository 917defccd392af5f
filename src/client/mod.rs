pub mod bridge;
pub mod connection;
pub mod events;

pub use bridge::BridgeConnector;
pub use connection::{
    ConnectError, ConnectOptions, Connection, ConnectionChannels, Connector, SendError,
};
pub use events::{ClientAction, ClientEvent, Direction, Position};
