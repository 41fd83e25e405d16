/*!
    frame level of the framing stack: aggregation of PDUs into an ethercat frame, and its
    encapsulation into an ethernet frame ready for a raw socket.

    Byte order differs between the two levels on purpose: ethernet fields are big-endian
    (network order), everything inside the ethercat frame is little-endian as specified for
    the fieldbus. Both sides are declared once and serialized through [crate::data].
*/

use bilge::prelude::*;
use packed_struct::prelude::*;

use crate::{
    data::{self, Cursor, Storage},
    error::FrameError,
    pdu::{Pdu, PduCommand, PduFooter, PduHeader},
    };


/// byte length of [EthernetHeader] on the wire
pub const ETHERNET_HEADER: usize = 14;
/// byte length of [EthercatHeader] on the wire
pub const ETHERCAT_HEADER: usize = 2;
/// byte length of [PduHeader] on the wire
pub const PDU_HEADER: usize = 10;
/// byte length of [PduFooter] on the wire
pub const PDU_FOOTER: usize = 2;

/// maximum on-wire byte length of an ethernet frame (FCS excluded), ethernet header plus the
/// standard 1500 bytes payload
pub const MAX_ETHERNET_FRAME: usize = ETHERNET_HEADER + 1500;
/// minimum on-wire byte length of an ethernet frame (FCS excluded), shorter content is zero
/// padded up to this floor
pub const MIN_ETHERNET_FRAME: usize = 60;
/// maximum number of PDUs in one ethercat frame, bound by the index width and the chaining
/// semantics of the hardware
pub const MAX_PDUS: usize = 15;
/// maximum byte length of the PDUs (headers, payloads and footers) of one ethercat frame
pub const MAX_ETHERCAT_PAYLOAD: usize = MAX_ETHERNET_FRAME - ETHERNET_HEADER - ETHERCAT_HEADER;
/// maximum payload byte length of a single PDU, alone in its frame
pub const MAX_PDU_DATA: usize = MAX_ETHERCAT_PAYLOAD - PDU_HEADER - PDU_FOOTER;

/// ethertype of ethercat frames carried directly in ethernet II frames. 0x8000 is reserved
/// for ethercat over UDP and not supported here
pub const ETHERTYPE_ETHERCAT: u16 = 0x88a4;


/// ethercat frame header (common to ethernet or UDP mediums) as described in ETG 1000.4 table 11
#[bitsize(16)]
#[derive(TryFromBits, DebugBits, Copy, Clone, Eq, PartialEq)]
pub struct EthercatHeader {
    /// length of the ethercat frame content (minus 2 bytes, which is the header)
    pub len: u11,
    reserved: u1,
    /// frame type
    pub ty: EthercatType,
}
data::bilge_pdudata!(EthercatHeader, u16);

/// type of ethercat frame
#[bitsize(4)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum EthercatType {
    /// process data unit, used to exchange with physical and logical memory in realtime or
    /// not. the only type this layer produces and accepts
    ///
    /// See ETG.1000.4
    PDU = 0x1,

    NetworkVariable = 0x4,

    /// mailbox gateway communication, between the master and non-slave devices
    ///
    /// See ETG.8200
    Mailbox = 0x5,
}


/** ethernet II header encapsulating one ethercat frame on the wire

    Multibyte fields are big-endian here, unlike everything in the ethercat frame behind it.
    The ethertype is left as a raw integer so foreign frames can be represented and filtered
    out, only the ethercat-specific checks refuse them.
*/
#[derive(PackedStruct, Debug, Clone, Eq, PartialEq)]
#[packed_struct(size_bytes="14", bit_numbering="lsb0", endian="msb")]
pub struct EthernetHeader {
    /// destination MAC address
    #[packed_field(bytes="8:13")]  pub dst: [u8; 6],
    /// source MAC address
    #[packed_field(bytes="2:7")]  pub src: [u8; 6],
    /// ethertype of the content, [ETHERTYPE_ETHERCAT] for ethercat
    #[packed_field(bytes="0:1")]  pub ty: u16,
}
data::packed_pdudata!(EthernetHeader);

impl EthernetHeader {
    /// header declaring an ethercat frame between the given MAC addresses
    pub fn ethercat(dst: [u8; 6], src: [u8; 6]) -> Self {
        Self {dst, src, ty: ETHERTYPE_ETHERCAT}
    }
    /// true if the content is declared to be an ethercat frame
    pub fn is_ethercat(&self) -> bool {
        self.ty == ETHERTYPE_ETHERCAT
    }
}


/**
    an ordered sequence of 1 to [MAX_PDUS] PDUs sharing one ethercat header

    The PDUs stay in the caller-supplied storage, the frame only borrows them, and their
    wire order is exactly the slice order. The header length is derived once at construction
    and is always the exact sum of the PDU wire lengths.
*/
pub struct PduFrame<'a, 'b> {
    header: EthercatHeader,
    pdus: &'b mut [Pdu<'a>],
}

impl<'a, 'b> PduFrame<'a, 'b> {
    /**
        gather the given PDUs under one ethercat header

        The slice must hold 1 to [MAX_PDUS] PDUs whose summed wire length fits in
        [MAX_ETHERCAT_PAYLOAD], anything else is a caller bug and panics. Chaining flags are
        not rewritten here, the caller sets them consistently with the slice order.
    */
    pub fn new(pdus: &'b mut [Pdu<'a>]) -> Self {
        assert!(!pdus.is_empty(), "an ethercat frame carries at least one PDU");
        assert!(pdus.len() <= MAX_PDUS, "an ethercat frame carries at most 15 PDUs");
        let length = pdus.iter().map(|pdu| pdu.wire_length()).sum::<usize>();
        assert!(length <= MAX_ETHERCAT_PAYLOAD, "PDUs exceed the ethercat frame budget");
        Self {
            header: EthercatHeader::new(u11::new(length as u16), EthercatType::PDU),
            pdus,
        }
    }

    /// ethercat header derived from the PDU set
    pub fn header(&self) -> EthercatHeader {self.header}
    /// the PDUs in wire order
    pub fn pdus(&self) -> &[Pdu<'a>] {&*self.pdus}
    /// total on-wire byte length, header included
    pub fn wire_length(&self) -> usize {
        ETHERCAT_HEADER + usize::from(u16::from(self.header.len()))
    }

    fn serialize(&self, cursor: &mut Cursor<&mut [u8]>) -> Result<(), FrameError> {
        cursor.pack(&self.header)?;
        for pdu in self.pdus.iter() {
            cursor.pack(&pdu.header)?;
            cursor.write(&pdu.data)?;
            cursor.pack(&PduFooter::new(pdu.working_count))?;
        }
        Ok(())
    }
}


/// shared zero bytes appended to undersized frames, read-only hence safe to share between
/// any number of concurrent frame serializations
static PADDING: [u8; MIN_ETHERNET_FRAME] = [0; MIN_ETHERNET_FRAME];

/**
    an ethernet frame wrapping one ethercat frame, zero-padded up to [MIN_ETHERNET_FRAME]

    This is the serialization boundary of the stack: one instance is built per communication
    cycle, serialized to a transport-supplied buffer, and dropped. The reception direction
    goes through the associated functions [Self::deserialize], [Self::identify] and
    [Self::pdu_count] which work on received bytes without building a frame.
*/
pub struct EthernetFrame<'a, 'b> {
    header: EthernetHeader,
    content: PduFrame<'a, 'b>,
    padding: usize,
}

impl<'a, 'b> EthernetFrame<'a, 'b> {
    /// wrap an ethercat frame, computing the padding needed to reach the minimal ethernet
    /// frame length
    pub fn new(header: EthernetHeader, content: PduFrame<'a, 'b>) -> Self {
        let unpadded = ETHERNET_HEADER + content.wire_length();
        Self {
            header,
            content,
            padding: MIN_ETHERNET_FRAME.saturating_sub(unpadded),
        }
    }

    /// ethernet header of the frame
    pub fn header(&self) -> &EthernetHeader {&self.header}
    /// the wrapped ethercat frame
    pub fn content(&self) -> &PduFrame<'a, 'b> {&self.content}
    /// total on-wire byte length, padding included
    pub fn wire_length(&self) -> usize {
        ETHERNET_HEADER + self.content.wire_length() + self.padding
    }

    /**
        stamp the first PDU with a transport-assigned identifier

        Index assignment belongs to the transport, which knows which identifiers are pending
        on the bus, so it happens right before sending rather than at construction.
    */
    pub fn set_index(&mut self, index: u8) {
        self.content.pdus[0].set_index(index);
    }

    /**
        write the complete frame to the given buffer, returning the number of bytes written

        The output is deterministic: repeated calls with the same frame produce byte-identical
        results. Fails with [FrameError::Insufficient] if the buffer cannot hold
        [Self::wire_length] bytes.
    */
    pub fn serialize(&self, dst: &mut [u8]) -> Result<usize, FrameError> {
        let length = self.wire_length();
        if dst.len() < length
            {return Err(FrameError::Insufficient)}
        let mut cursor = Cursor::new(&mut dst[.. length]);
        cursor.pack(&self.header)?;
        self.content.serialize(&mut cursor)?;
        cursor.write(&PADDING[.. self.padding])?;
        log::trace!("serialized frame of {} bytes, {} PDUs", length, self.content.pdus.len());
        Ok(cursor.finish().len())
    }

    /**
        decode a received frame into the given PDU slots

        Slots are consumed strictly in wire order and must match the sent frame: one slot per
        PDU, each with a payload buffer of exactly the length the PDU declares. The chaining
        flags found on the wire are checked against the slot count, so a miscounted slot set
        is refused instead of decoding padding as a header.

        On error, slots already decoded keep their content, the whole batch is to be
        discarded by the caller. Each failure kind is a distinct [FrameError] variant so the
        transport can decide to drop and retry the cycle.
    */
    pub fn deserialize(received: &[u8], slots: &mut [Pdu]) -> Result<(), FrameError> {
        let mut cursor = Cursor::new(received);
        let header = cursor.unpack::<EthernetHeader>()
            .map_err(|_| FrameError::TooSmall)?;
        if !header.is_ethercat() {
            log::warn!("rejected frame with ethertype {:#06x}", header.ty);
            return Err(FrameError::NotEthercat);
        }
        if received.len() < MIN_ETHERNET_FRAME
            {return Err(FrameError::TooSmall)}

        let ethercat = cursor.unpack::<EthercatHeader>()
            .map_err(|_| FrameError::InvalidHeader)?;
        if ethercat.ty() != EthercatType::PDU
            {return Err(FrameError::InvalidHeader)}
        if usize::from(u16::from(ethercat.len())) > cursor.remain().len()
            {return Err(FrameError::InvalidHeader)}

        let count = slots.len();
        for (rank, slot) in slots.iter_mut().enumerate() {
            let header = cursor.unpack::<PduHeader>()
                .map_err(|_| FrameError::Corrupted)?;
            PduCommand::try_from(header.command())
                .map_err(|_| FrameError::UnknownCommand(header.command()))?;
            if usize::from(u16::from(header.len())) != slot.data.len()
                {return Err(FrameError::Corrupted)}
            // the wire chain and the slot count must designate the same last PDU
            if header.next() != (rank + 1 < count)
                {return Err(FrameError::Corrupted)}
            let content = cursor.read(slot.data.len())
                .map_err(|_| FrameError::Corrupted)?;
            slot.data.copy_from_slice(content);
            let footer = cursor.unpack::<PduFooter>()
                .map_err(|_| FrameError::Corrupted)?;
            slot.working_count = footer.working_count();
            slot.header = header;
        }
        log::trace!("deserialized frame of {} bytes, {} PDUs", received.len(), slots.len());
        Ok(())
    }

    /**
        extract the index of the first PDU of a received frame, without a full decode

        Only the ethernet and ethercat headers and the first PDU header are walked, no
        payload buffer is needed. A transport uses this to route an incoming frame to the
        pending request waiting for that index before paying for the full decode.
    */
    pub fn identify(received: &[u8]) -> Result<u8, FrameError> {
        let mut cursor = Cursor::new(received);
        let header = cursor.unpack::<EthernetHeader>()
            .map_err(|_| FrameError::TooSmall)?;
        if !header.is_ethercat()
            {return Err(FrameError::NotEthercat)}
        let ethercat = cursor.unpack::<EthercatHeader>()
            .map_err(|_| FrameError::TooSmall)?;
        if ethercat.ty() != EthercatType::PDU
            {return Err(FrameError::InvalidHeader)}
        if usize::from(u16::from(ethercat.len())) < PDU_HEADER
            {return Err(FrameError::InvalidHeader)}
        let pdu = cursor.unpack::<PduHeader>()
            .map_err(|_| FrameError::Corrupted)?;
        Ok(pdu.index())
    }

    /**
        count the PDUs of a received frame by walking the chaining flags, without touching
        any payload

        Lets a transport size its slot set before calling [Self::deserialize].
    */
    pub fn pdu_count(received: &[u8]) -> Result<usize, FrameError> {
        let mut cursor = Cursor::new(received);
        let header = cursor.unpack::<EthernetHeader>()
            .map_err(|_| FrameError::TooSmall)?;
        if !header.is_ethercat()
            {return Err(FrameError::NotEthercat)}
        let ethercat = cursor.unpack::<EthercatHeader>()
            .map_err(|_| FrameError::TooSmall)?;
        if ethercat.ty() != EthercatType::PDU
            {return Err(FrameError::InvalidHeader)}
        let declared = usize::from(u16::from(ethercat.len()));
        let mut content = Cursor::new(cursor.read(declared)
            .map_err(|_| FrameError::InvalidHeader)?);

        let mut count = 0;
        loop {
            let header = content.unpack::<PduHeader>()
                .map_err(|_| FrameError::Corrupted)?;
            content.read(usize::from(u16::from(header.len())) + PDU_FOOTER)
                .map_err(|_| FrameError::Corrupted)?;
            count += 1;
            if !header.next() {break}
        }
        Ok(count)
    }
}
