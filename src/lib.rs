/*!
    Wire-level framing of ethercat telegrams, bit-exact as the hardware expects them.

    Ethercat is a realtime industrial fieldbus: the master sends one ethernet frame holding
    one or more PDUs (Process Data Units) and every slave processes it in line as it
    physically passes through, reading or writing bytes and incrementing a working counter
    without store-and-forward delay. Everything therefore depends on byte-for-byte,
    bit-for-bit layout fidelity, which is what this crate provides:

    - [PduCommand] and the addressing interpretations of the 32 bit address slot
    - [Pdu], one command with its caller-owned payload and working counter
    - [PduFrame], 1 to 15 PDUs under one ethercat header with exact length accounting
    - [EthernetFrame], the ethernet encapsulation with zero padding to the minimal frame
      length, serialization, validated deserialization and the index peek used by transports
      to route answers

    Sending and receiving the bytes (raw socket, UDP), slave state machines, mailbox
    protocols and distributed clocks are deliberately not here, they live in the layers
    using this one.
*/

mod data;
mod error;
mod frame;
mod pdu;

pub use crate::data::{Cursor, PackingError, PackingResult, PduData, Storage};
pub use crate::error::FrameError;
pub use crate::frame::*;
pub use crate::pdu::*;
