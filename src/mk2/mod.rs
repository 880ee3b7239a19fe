//! MK2 protocol driver: framing, decoding and the handshake/poll cycle.
pub mod command;    // Outbound command frames
pub mod connection; // Worker task owning the byte stream
pub mod driver;     // Protocol state machine
pub mod frame;      // Wire format, checksum and frame classification
pub mod scale;      // Scale factors for RAM variables
pub mod snapshot;   // Decoded telemetry
pub mod sync;       // Frame synchronizer
