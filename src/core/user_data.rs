/*
* Every SQE carries a 64-bit user_data that comes back on its CQE. We use it to
* route readiness completions back to their owner:
*
* 1. Which session the poll belongs to. Session ids are never reused, so a
*    completion for a session torn down earlier in the batch finds nothing.
*
* 2. Which operation - Accept, Recv, Send, Connect, Tick or Cancel.
*
* 3. Which direction the Recv/Send belongs to.
*/

use crate::core::stream_pump::{Direction, OpCode, Operation};

const OPCODE_BITS: u64 = 7;
const DIR_BITS:    u64 = 1;
const ID_BITS:     u64 = 64 - (OPCODE_BITS + DIR_BITS);

const OPCODE_MASK: u64 = (1 << OPCODE_BITS) - 1;               // 0x7F
const DIR_MASK:    u64 = (1 << DIR_BITS) - 1;                  // 0x01
const ID_MASK:     u64 = (1 << ID_BITS) - 1;                   // 0x00FF_FFFF_FFFF_FFFF

const OPCODE_SHIFT: u64 = 0;
const DIR_SHIFT:    u64 = OPCODE_SHIFT + OPCODE_BITS;          // 7
const ID_SHIFT:     u64 = DIR_SHIFT + DIR_BITS;                // 8

#[inline]
pub fn pack_user_data(id: u64, op: Operation) -> u64 {
    let (opcode, dir_bit): (OpCode, u8) = match op {
        Operation::Accept    => (OpCode::Accept,  0),
        Operation::Recv(dir) => (OpCode::Recv,    dir as u8),
        Operation::Send(dir) => (OpCode::Send,    dir as u8),
        Operation::Tick      => (OpCode::Tick,    0),
        Operation::Cancel    => (OpCode::Cancel,  0),
        Operation::Connect   => (OpCode::Connect, 0),
    };

    debug_assert!((id & !ID_MASK) == 0, "session id exceeds 56 bits");

    ((id & ID_MASK)   << ID_SHIFT)
    | (((dir_bit as u64) & DIR_MASK) << DIR_SHIFT)
    | ((opcode as u64) & OPCODE_MASK)
}

/// `None` if the tag carries an opcode we never submit.
#[inline]
pub fn unpack_user_data(tag: u64) -> Option<(u64, Operation)> {
    let id  = (tag >> ID_SHIFT)  & ID_MASK;
    let dir = ((tag >> DIR_SHIFT) & DIR_MASK) as u8;
    let opc = ((tag >> OPCODE_SHIFT) & OPCODE_MASK) as u8;

    let dir = if dir == 0 { Direction::ClientToUpstream } else { Direction::UpstreamToClient };
    let op = match OpCode::try_from_u8(opc)? {
        OpCode::Accept  => Operation::Accept,
        OpCode::Recv    => Operation::Recv(dir),
        OpCode::Send    => Operation::Send(dir),
        OpCode::Tick    => Operation::Tick,
        OpCode::Cancel  => Operation::Cancel,
        OpCode::Connect => Operation::Connect,
    };

    Some((id, op))
}
