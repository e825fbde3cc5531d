// The in-memory microcode format.
//
// This is the unpacked working form shared by the lowerer, the jump
// resolver, and the emitter. Cross references between instructions,
// pending jumps, and frames are all integer indices into the owning
// arrays; nothing holds a back-pointer.

use enumflags2::BitFlags;

use crate::layout::Field;


// Jump target of an instruction that has not been resolved yet.
pub const UNRESOLVED: u32 = u32::MAX;

// Switch-bank entry that no case has claimed yet.
pub const UNFILLED: u32 = u32::MAX;


// The single-bit instruction fields.
#[derive(BitFlags, Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum Flag {
    StateCapture = 0b000001,
    VarOrTimer   = 0b000010,
    Branch       = 0b000100,
    ForcedJmp    = 0b001000,
    Sub          = 0b010000,
    Rtn          = 0b100000,
}


// One horizontal microcode word, unpacked.
//
// Control encoding:
//   branch=1, forced_jmp=0, var_or_timer=1   conditional; taken to
//                                            jadr when input[varsel]
//                                            reads 1
//   forced_jmp=1, var_or_timer=0             unconditional jump to jadr
//   forced_jmp=1, var_or_timer=1             switch dispatch through
//                                            bank switch_sel on the
//                                            input named by switch_adr
//
// `label` is debug metadata only and never reaches the packed word.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub state_set: u32,
    pub state_mask: u32,
    pub jadr: u32,
    pub varsel: u32,
    pub timer_sel: u32,
    pub timer_ld: u32,
    pub switch_sel: u32,
    pub switch_adr: u32,
    pub flags: BitFlags<Flag>,
    pub label: Option<String>,
}


impl Instruction {
    pub fn noop() -> Instruction {
        Instruction {
            state_set: 0,
            state_mask: 0,
            jadr: 0,
            varsel: 0,
            timer_sel: 0,
            timer_ld: 0,
            switch_sel: 0,
            switch_adr: 0,
            flags: BitFlags::empty(),
            label: None,
        }
    }

    // Commit the masked state bits.
    pub fn state(set: u32, mask: u32) -> Instruction {
        Instruction {
            state_set: set,
            state_mask: mask,
            flags: BitFlags::from_flag(Flag::StateCapture),
            ..Instruction::noop()
        }
    }

    // Conditional branch on one input bit; target patched later.
    pub fn branch(varsel: u32) -> Instruction {
        Instruction {
            varsel,
            jadr: UNRESOLVED,
            flags: Flag::Branch | Flag::VarOrTimer,
            ..Instruction::noop()
        }
    }

    // Unconditional jump to a known address.
    pub fn jump(target: u32) -> Instruction {
        Instruction {
            jadr: target,
            flags: BitFlags::from_flag(Flag::ForcedJmp),
            ..Instruction::noop()
        }
    }

    // Unconditional jump whose target is not known yet.
    pub fn jump_unresolved() -> Instruction {
        Instruction::jump(UNRESOLVED)
    }

    // Dispatch through a switch bank on the given input selector.
    pub fn dispatch(bank: u32, selector: u32) -> Instruction {
        Instruction {
            switch_sel: bank,
            switch_adr: selector,
            jadr: UNRESOLVED,
            flags: Flag::ForcedJmp | Flag::VarOrTimer,
            ..Instruction::noop()
        }
    }

    pub fn is(&self, flag: Flag) -> bool {
        self.flags.contains(flag)
    }

    // The value an instruction contributes to one packed field.
    pub fn field(&self, field: Field) -> u32 {
        match field {
            Field::State        => self.state_set,
            Field::Mask         => self.state_mask,
            Field::Jadr         => self.jadr,
            Field::Varsel       => self.varsel,
            Field::TimerSel     => self.timer_sel,
            Field::TimerLd      => self.timer_ld,
            Field::SwitchSel    => self.switch_sel,
            Field::SwitchAdr    => self.switch_adr,
            Field::StateCapture => self.is(Flag::StateCapture) as u32,
            Field::VarOrTimer   => self.is(Flag::VarOrTimer) as u32,
            Field::Branch       => self.is(Flag::Branch) as u32,
            Field::ForcedJmp    => self.is(Flag::ForcedJmp) as u32,
            Field::Sub          => self.is(Flag::Sub) as u32,
            Field::Rtn          => self.is(Flag::Rtn) as u32,
        }
    }
}


// Which structured construct a frame belongs to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FrameKind {
    While,
    For,
    Switch,
}


// Lowering-time record of the innermost loop/switch targets. The
// break target is always finalized when the frame is popped; the
// continue target of a for-loop is finalized once the update's
// address is known.
#[derive(Clone, Debug)]
pub struct FrameRecord {
    pub kind: FrameKind,
    pub continue_target: Option<u32>,
    pub break_target: Option<u32>,
}


// A jump whose target address was not known at emission time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum JumpKind {
    // To the break target of the given frame.
    Break(usize),
    // To the continue target of the given frame.
    Continue(usize),
    // To the address one past the last instruction.
    Exit,
    // To a concrete address recorded when it became known.
    Direct(usize),
}


#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PendingJump {
    pub index: usize,
    pub kind: JumpKind,
}


// The secondary dispatch memory. Each switch statement owns one bank
// of 2^offset_bits words, indexed by scrutinee value, each holding an
// instruction address.
#[derive(Clone, Debug)]
pub struct SwitchTable {
    offset_bits: u8,
    banks: Vec<Vec<u32>>,
}


impl SwitchTable {
    pub fn new(offset_bits: u8) -> SwitchTable {
        SwitchTable { offset_bits, banks: Vec::new() }
    }

    pub fn bank_size(&self) -> usize {
        1 << self.offset_bits
    }

    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    // Reserve a fresh bank, every entry unfilled.
    pub fn allocate(&mut self) -> usize {
        self.banks.push(vec![UNFILLED; self.bank_size()]);
        self.banks.len() - 1
    }

    pub fn get(&self, bank: usize, offset: usize) -> u32 {
        self.banks[bank][offset]
    }

    pub fn set(&mut self, bank: usize, offset: usize, addr: u32) {
        self.banks[bank][offset] = addr;
    }

    // Point every still-unfilled entry of a bank at `addr`.
    pub fn fill_unfilled(&mut self, bank: usize, addr: u32) {
        for entry in self.banks[bank].iter_mut() {
            if *entry == UNFILLED {
                *entry = addr;
            }
        }
    }

    // All entries, ordered (bank << offset_bits) | offset.
    pub fn words(&self) -> impl Iterator<Item = u32> + '_ {
        self.banks.iter().flat_map(|b| b.iter().copied())
    }
}


// Running per-field maxima, updated on every emission and patch, and
// checked against the layout before packing.
#[derive(Clone, Debug, Default)]
pub struct FieldMaxima {
    max: [u32; Field::COUNT],
}


impl FieldMaxima {
    pub fn observe(&mut self, field: Field, value: u32) {
        let slot = &mut self.max[field.index()];
        if value > *slot {
            *slot = value;
        }
    }

    // Unresolved jump targets are sentinels, not addresses, and are
    // recorded later when they get patched.
    pub fn observe_instruction(&mut self, instruction: &Instruction) {
        for &field in Field::ALL.iter() {
            if field == Field::Jadr && instruction.jadr == UNRESOLVED {
                continue;
            }
            self.observe(field, instruction.field(field));
        }
    }

    pub fn get(&self, field: Field) -> u32 {
        self.max[field.index()]
    }
}


// Everything the lowerer hands to the resolver, and the resolver (in
// place) to the emitter.
#[derive(Clone, Debug)]
pub struct Lowered {
    pub code: Vec<Instruction>,
    pub pending: Vec<PendingJump>,
    pub frames: Vec<FrameRecord>,
    pub switches: SwitchTable,
    pub maxima: FieldMaxima,
}
