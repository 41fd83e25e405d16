/*!
    PDU level of the framing stack.

    An ethercat frame intended for slaves contains any number of PDUs (Process Data Unit),
    each PDU is a command acting on one of the 2 memory types:

    - **Physical Memory** (aka. registers)

        each slave has its own physical memory, commands for physical memory (`*P*`, `B*`)
        are addressing a specific slave, or combining the memory reads from all slaves

    - **Logical Memory** (aka. fieldbus memory)

        this memory doesn't physically exist anywhere, but can be read/write using `L*`
        commands with each slave contributing to the record according to the FMMU mapping
        set before

    See variants of [PduCommand] for more details. This layer does not interpret what the
    payload bytes mean, it only carries them addressed by a command and a 32 bit address.
*/

use bilge::prelude::*;

use crate::{
    data::{self, Storage},
    frame::{MAX_PDU_DATA, PDU_FOOTER, PDU_HEADER},
    };


/// the possible PDU commands
#[bitsize(8)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum PduCommand {
    /// no operation
    NOP = 0x00,

    /// auto-incremented slave read
    APRD = 0x01,
    /// auto-incremented slave write
    APWR = 0x02,
    /// auto-incremented slave read & write
    APRW = 0x03,

    /// fixed slave read
    FPRD = 0x04,
    /// fixed slave write
    FPWR = 0x05,
    /// fixed slave read & write
    FPRW = 0x06,

    /// broadcast read
    BRD = 0x07,
    /// broadcast write
    BWR = 0x08,
    /// broadcast read & write
    BRW = 0x09,

    /// logical memory read
    LRD = 0x0A,
    /// logical memory write
    LWR = 0x0B,
    /// logical memory read & write
    LRW = 0x0C,

    /// auto-incremented slave read multiple write
    ARMW = 0x0D,
    /// fixed slave read multiple write
    FRMW = 0x0E,
}

/// how the slaves interpret the 32 bit address slot of a PDU, implied by its command
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Addressing {
    /// no slave is addressed
    None,
    /// every slave on the segment executes
    Broadcast,
    /// position addressing, the low half of the address is an auto-incremented counter
    AutoIncremented,
    /// configured station addressing, the low half matches a fixed address set by the master
    Fixed,
    /// flat addressing in the logical memory mapped by the FMMUs
    Logical,
}

impl PduCommand {
    /// addressing mode the slaves will use for this command
    ///
    /// the framing layer does not enforce this mapping, it accepts any address value with
    /// any command, choosing consistently is up to the caller
    pub fn addressing(&self) -> Addressing {
        match self {
            Self::NOP => Addressing::None,
            Self::BRD | Self::BWR | Self::BRW => Addressing::Broadcast,
            Self::APRD | Self::APWR | Self::APRW | Self::ARMW => Addressing::AutoIncremented,
            Self::FPRD | Self::FPWR | Self::FPRW | Self::FRMW => Addressing::Fixed,
            Self::LRD | Self::LWR | Self::LRW => Addressing::Logical,
        }
    }
}

/// dynamically specifies a destination address on the ethercat loop
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlaveAddress {
    /// every slave will receive and execute
    Broadcast,
    /// address will be determined by the topology (index of the slave in the ethernet loop)
    AutoIncremented(u16),
    /// address has been set by the master previously
    Fixed(u16),
    /// the logical memory is the destination, all slaves are concerned
    Logical(u32),
}

impl SlaveAddress {
    /// command reading at this address
    pub fn read_command(&self) -> PduCommand {
        match self {
            Self::Broadcast => PduCommand::BRD,
            Self::AutoIncremented(_) => PduCommand::APRD,
            Self::Fixed(_) => PduCommand::FPRD,
            Self::Logical(_) => PduCommand::LRD,
        }
    }
    /// command writing at this address
    pub fn write_command(&self) -> PduCommand {
        match self {
            Self::Broadcast => PduCommand::BWR,
            Self::AutoIncremented(_) => PduCommand::APWR,
            Self::Fixed(_) => PduCommand::FPWR,
            Self::Logical(_) => PduCommand::LWR,
        }
    }
    /// command reading then writing at this address in one bus traversal
    pub fn exchange_command(&self) -> PduCommand {
        match self {
            Self::Broadcast => PduCommand::BRW,
            Self::AutoIncremented(_) => PduCommand::APRW,
            Self::Fixed(_) => PduCommand::FPRW,
            Self::Logical(_) => PduCommand::LRW,
        }
    }
    /**
        raw value for the address slot of a PDU header, accessing `offset` in the addressed
        memory

        The low half carries the slave designation, the high half the memory offset, except
        for logical addressing where the whole 32 bits are the flat address and `offset` is
        ignored. Position addressing negates the topological index so each slave can
        increment the counter and act when it reaches zero.
    */
    pub fn to_raw(&self, offset: u16) -> u32 {
        let low = match *self {
            Self::Broadcast => 0,
            Self::AutoIncremented(position) => 0u16.wrapping_sub(position),
            Self::Fixed(fixed) => fixed,
            Self::Logical(address) => return address,
        };
        u32::from(offset) << 16 | u32::from(low)
    }
}


/// header of a PDU as described in ETG 1000.4 table 13
#[bitsize(80)]
#[derive(FromBits, DebugBits, Clone, Eq, PartialEq)]
pub struct PduHeader {
    /// PDU command, specifying which memory is accessed, the addressing type, and what
    /// read/write operation is performed
    pub command: u8,
    /// PDU identifier assigned by the master, to pair answers with requests and detect
    /// duplicated or lost frames
    pub index: u8,
    /// address of the data to access, its interpretation depends on the command
    pub address: u32,
    /// byte length of the data following the header, excluding the footer
    pub len: u11,
    reserved: u3,
    /// set by the hardware once the frame has traversed the ring
    pub circulating: bool,
    /// true if an other PDU follows in the same frame
    pub next: bool,
    /// logical OR of the event requests of all traversed slaves
    pub irq: u16,
}
data::bilge_pdudata!(PduHeader, u80, u128);

/// footer of a PDU, filled by the slaves
#[bitsize(16)]
#[derive(FromBits, DebugBits, Copy, Clone, Eq, PartialEq)]
pub struct PduFooter {
    /// incremented by every slave that executed the command, compared by the master against
    /// an expected value to detect failures
    pub working_count: u16,
}
data::bilge_pdudata!(PduFooter, u16);


/**
    one unit of work in an ethercat frame: a command, an address, and the payload bytes it
    carries, processed in line by the slaves as the frame passes through them

    The payload buffer stays owned by the caller and is borrowed for the lifetime of the PDU,
    nothing is copied at construction. On reception the slaves' answer is written back into
    the same buffer.

    Structures at this level live for one communication cycle: built, sent, unframed, dropped.
*/
pub struct Pdu<'a> {
    pub(crate) header: PduHeader,
    pub(crate) data: &'a mut [u8],
    pub(crate) working_count: u16,
}

impl<'a> Pdu<'a> {
    /**
        build a PDU executing `command` at `address` with the given payload

        `next` shall be true on every PDU of a frame but the last one, consistently with its
        position in the sequence, this layer does not derive it.

        The payload must be strictly smaller than [MAX_PDU_DATA], larger payloads are a
        caller bug and panic immediately rather than producing an unsendable frame.
    */
    pub fn new(command: PduCommand, index: u8, address: u32, next: bool, data: &'a mut [u8]) -> Self {
        assert!(data.len() < MAX_PDU_DATA, "PDU data exceeds the frame budget");
        Self {
            header: PduHeader::new(
                u8::from(command),
                index,
                address,
                u11::new(data.len() as u16),
                false,
                next,
                0,
                ),
            data,
            working_count: 0,
        }
    }

    /**
        a blank slot for reception

        The answer payload is expected to be exactly the buffer length, decoding a frame
        whose matching PDU declares any other length fails.
    */
    pub fn slot(data: &'a mut [u8]) -> Self {
        Self::new(PduCommand::NOP, 0, 0, false, data)
    }

    /// total on-wire byte length of this PDU: header, payload and footer
    pub fn wire_length(&self) -> usize {
        PDU_HEADER + self.data.len() + PDU_FOOTER
    }

    /// command executed by this PDU
    pub fn command(&self) -> PduCommand {
        // only validated commands reach the header, both at construction and decode
        PduCommand::try_from(self.header.command()).unwrap()
    }
    /// master-assigned identifier of this PDU
    pub fn index(&self) -> u8 {self.header.index()}
    /// overwrite the master-assigned identifier
    pub fn set_index(&mut self, index: u8) {self.header.set_index(index)}
    /// raw 32 bit address accessed by the command
    pub fn address(&self) -> u32 {self.header.address()}
    /// true if an other PDU follows in the same frame
    pub fn next(&self) -> bool {self.header.next()}
    /// declare whether an other PDU follows in the same frame
    pub fn set_next(&mut self, next: bool) {self.header.set_next(next)}
    /// true once the frame has traversed the ring without being picked by the master
    pub fn circulating(&self) -> bool {self.header.circulating()}
    /// event requests combined from all traversed slaves
    pub fn irq(&self) -> u16 {self.header.irq()}
    /// payload bytes
    pub fn data(&self) -> &[u8] {&*self.data}
    /// payload bytes, writable in place
    pub fn data_mut(&mut self) -> &mut [u8] {&mut *self.data}
    /// number of slaves that executed the command, meaningful after a bus round trip only
    pub fn working_count(&self) -> u16 {self.working_count}
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PduData;

    #[test]
    fn header_wire_image() {
        let header = PduHeader::new(
            u8::from(PduCommand::BRD),
            123,
            0xabcdef12,
            u11::new(4),
            false,
            false,
            0,
            );
        let mut buffer = [0; 10];
        header.pack(&mut buffer).unwrap();
        assert_eq!(buffer, [0x07, 0x7b, 0x12, 0xef, 0xcd, 0xab, 0x04, 0x00, 0x00, 0x00]);
        assert_eq!(PduHeader::unpack(&buffer).unwrap(), header);
    }

    #[test]
    fn header_flag_bits() {
        let mut header = PduHeader::new(0, 0, 0, u11::new(0x7ff), false, true, 0xbeef);
        header.set_circulating(true);
        let mut buffer = [0; 10];
        header.pack(&mut buffer).unwrap();
        // len fills bits 0-10, circulating is bit 14, next is bit 15
        assert_eq!(&buffer[6 .. 8], &0xc7ff_u16.to_le_bytes());
        assert_eq!(&buffer[8 ..], &0xbeef_u16.to_le_bytes());
    }

    #[test]
    fn footer_wire_image() {
        let mut buffer = [0; 2];
        PduFooter::new(0x0302).pack(&mut buffer).unwrap();
        assert_eq!(buffer, [0x02, 0x03]);
        assert_eq!(PduFooter::unpack(&buffer).unwrap().working_count(), 0x0302);
    }

    #[test]
    fn command_codes() {
        assert!(matches!(PduCommand::try_from(0x07), Ok(PduCommand::BRD)));
        assert!(matches!(PduCommand::try_from(0x0e), Ok(PduCommand::FRMW)));
        // the command set is closed, anything else must be refused
        assert!(PduCommand::try_from(0x0f).is_err());
        assert!(PduCommand::try_from(0xff).is_err());
    }

    #[test]
    fn command_addressing() {
        assert_eq!(PduCommand::NOP.addressing(), Addressing::None);
        assert_eq!(PduCommand::BWR.addressing(), Addressing::Broadcast);
        assert_eq!(PduCommand::APRD.addressing(), Addressing::AutoIncremented);
        assert_eq!(PduCommand::ARMW.addressing(), Addressing::AutoIncremented);
        assert_eq!(PduCommand::FPRW.addressing(), Addressing::Fixed);
        assert_eq!(PduCommand::FRMW.addressing(), Addressing::Fixed);
        assert_eq!(PduCommand::LRW.addressing(), Addressing::Logical);
    }

    #[test]
    fn slave_addressing() {
        assert_eq!(SlaveAddress::Broadcast.read_command(), PduCommand::BRD);
        assert_eq!(SlaveAddress::AutoIncremented(2).write_command(), PduCommand::APWR);
        assert_eq!(SlaveAddress::Fixed(0x1001).exchange_command(), PduCommand::FPRW);
        assert_eq!(SlaveAddress::Logical(0).read_command(), PduCommand::LRD);

        assert_eq!(SlaveAddress::Broadcast.to_raw(0x0130), 0x0130_0000);
        assert_eq!(SlaveAddress::AutoIncremented(2).to_raw(0x0010), 0x0010_fffe);
        assert_eq!(SlaveAddress::Fixed(0x1001).to_raw(0x0120), 0x0120_1001);
        assert_eq!(SlaveAddress::Logical(0xabcd_ef12).to_raw(0x0010), 0xabcd_ef12);
    }

    #[test]
    fn pdu_length_snapshot() {
        let mut payload = [0x55; 6];
        let pdu = Pdu::new(PduCommand::FPWR, 1, SlaveAddress::Fixed(3).to_raw(0x1000), false, &mut payload);
        assert_eq!(u16::from(pdu.header.len()), 6);
        assert_eq!(pdu.wire_length(), PDU_HEADER + 6 + PDU_FOOTER);
        assert_eq!(pdu.working_count(), 0);
    }

    #[test]
    #[should_panic]
    fn pdu_data_over_budget() {
        let mut payload = vec![0; MAX_PDU_DATA];
        Pdu::new(PduCommand::LWR, 0, 0, false, &mut payload);
    }
}
