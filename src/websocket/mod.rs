//! WebSocket Relay
//!
//! Relays traffic between one embedded device and any number of browser
//! clients over plain WebSocket text frames.
//!
//! ## Architecture
//!
//! - **RelayHub**: Owns the device slot and client set, routes every frame
//! - **Handler**: Handles WebSocket upgrade and the per-connection loops
//! - **Messages**: Inbound frame parsing and hub-generated notices
//!
//! ## Protocol
//!
//! - Device sends the literal text `ESP32` to identify itself (no reply)
//! - Device JSON frames are broadcast verbatim to all clients; frames with a
//!   `servoPos` field are also persisted
//! - Client JSON frames are forwarded verbatim to the device
//! - When the device drops, clients receive `{"type":"ESP32_DISCONNECTED"}`
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8080/');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({cmd: 'reset'}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'ESP32_DISCONNECTED') console.log('device offline');
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{Departure, HubConfig, HubStatus, Peer, PeerId, Persistence, RelayHub, RouteOutcome};
pub use messages::{FrameError, HubNotice, InboundFrame, Record, IDENTIFY_TOKEN};
