// The packed-word bit layout.
//
// Field widths are a configuration header of the compiler, loaded
// from a RON file; the defaults below describe the stock 24-bit
// engine. Packing concatenates the fields MSB to LSB in the fixed
// order of Field::ALL. Changing any width means recompiling every
// image that the engine loads.

use std::fmt;
use std::fs::File;

use enumflags2::BitFlags;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::microcode::{FieldMaxima, Flag, Instruction};


// Packed-word fields, most significant first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Field {
    State,
    Mask,
    Jadr,
    Varsel,
    TimerSel,
    TimerLd,
    SwitchSel,
    SwitchAdr,
    StateCapture,
    VarOrTimer,
    Branch,
    ForcedJmp,
    Sub,
    Rtn,
}


impl Field {
    pub const COUNT: usize = 14;

    pub const ALL: [Field; Field::COUNT] = [
        Field::State,
        Field::Mask,
        Field::Jadr,
        Field::Varsel,
        Field::TimerSel,
        Field::TimerLd,
        Field::SwitchSel,
        Field::SwitchAdr,
        Field::StateCapture,
        Field::VarOrTimer,
        Field::Branch,
        Field::ForcedJmp,
        Field::Sub,
        Field::Rtn,
    ];

    pub fn index(self) -> usize {
        match self {
            Field::State        => 0,
            Field::Mask         => 1,
            Field::Jadr         => 2,
            Field::Varsel       => 3,
            Field::TimerSel     => 4,
            Field::TimerLd      => 5,
            Field::SwitchSel    => 6,
            Field::SwitchAdr    => 7,
            Field::StateCapture => 8,
            Field::VarOrTimer   => 9,
            Field::Branch       => 10,
            Field::ForcedJmp    => 11,
            Field::Sub          => 12,
            Field::Rtn          => 13,
        }
    }
}


impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Field::State        => "STATE",
            Field::Mask         => "MASK",
            Field::Jadr         => "JADR",
            Field::Varsel       => "VARSEL",
            Field::TimerSel     => "TIMERSEL",
            Field::TimerLd      => "TIMERLD",
            Field::SwitchSel    => "SWITCH_SEL",
            Field::SwitchAdr    => "SWITCH_ADR",
            Field::StateCapture => "STATE_CAPTURE",
            Field::VarOrTimer   => "VAR_OR_TIMER",
            Field::Branch       => "BRANCH",
            Field::ForcedJmp    => "FORCED_JMP",
            Field::Sub          => "SUB",
            Field::Rtn          => "RTN",
        };
        write!(f, "{}", name)
    }
}


// Per-field widths in bits, plus the switch-bank offset width. Any
// subset may be overridden from a layout file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Layout {
    pub state: u8,
    pub mask: u8,
    pub jadr: u8,
    pub varsel: u8,
    pub timer_sel: u8,
    pub timer_ld: u8,
    pub switch_sel: u8,
    pub switch_adr: u8,
    pub state_capture: u8,
    pub var_or_timer: u8,
    pub branch: u8,
    pub forced_jmp: u8,
    pub sub: u8,
    pub rtn: u8,
    pub switch_offset_bits: u8,
}


impl Default for Layout {
    fn default() -> Layout {
        Layout {
            state: 3,
            mask: 3,
            jadr: 5,
            varsel: 2,
            timer_sel: 1,
            timer_ld: 1,
            switch_sel: 2,
            switch_adr: 1,
            state_capture: 1,
            var_or_timer: 1,
            branch: 1,
            forced_jmp: 1,
            sub: 1,
            rtn: 1,
            switch_offset_bits: 8,
        }
    }
}


impl Layout {
    pub fn load(path: &str) -> Result<Layout> {
        let file = File::open(path).map_err(|cause| Error::Io {
            path: String::from(path),
            cause,
        })?;
        ron::de::from_reader(file).map_err(|e| Error::Parse {
            message: format!("layout {}: {}", path, e),
            at: None,
        })
    }

    pub fn width(&self, field: Field) -> u8 {
        match field {
            Field::State        => self.state,
            Field::Mask         => self.mask,
            Field::Jadr         => self.jadr,
            Field::Varsel       => self.varsel,
            Field::TimerSel     => self.timer_sel,
            Field::TimerLd      => self.timer_ld,
            Field::SwitchSel    => self.switch_sel,
            Field::SwitchAdr    => self.switch_adr,
            Field::StateCapture => self.state_capture,
            Field::VarOrTimer   => self.var_or_timer,
            Field::Branch       => self.branch,
            Field::ForcedJmp    => self.forced_jmp,
            Field::Sub          => self.sub,
            Field::Rtn          => self.rtn,
        }
    }

    // Width of one packed instruction word.
    pub fn word_bits(&self) -> u32 {
        Field::ALL.iter().map(|&f| self.width(f) as u32).sum()
    }

    // Hex digits per line in the emitted memory images.
    pub fn hex_digits(&self) -> usize {
        ((self.word_bits() + 3) / 4) as usize
    }

    // Largest value a field can carry.
    pub fn limit(&self, field: Field) -> u32 {
        let w = self.width(field) as u32;
        if w >= 32 {
            u32::max_value()
        } else {
            (1u32 << w) - 1
        }
    }

    // Assert that every observed field value fits its width.
    pub fn check(&self, maxima: &FieldMaxima) -> Result<()> {
        if self.word_bits() > 64 {
            return Err(Error::Parse {
                message: format!(
                    "layout is {} bits wide; the packer tops out at 64",
                    self.word_bits()
                ),
                at: None,
            });
        }
        for &field in Field::ALL.iter() {
            let observed = maxima.get(field);
            let limit = self.limit(field);
            if observed > limit {
                return Err(Error::FieldOverflow { field, observed, limit });
            }
        }
        Ok(())
    }

    // Concatenate the fields MSB to LSB into one word. Values are
    // masked to their width; check() is the overflow gate.
    pub fn pack(&self, instruction: &Instruction) -> u64 {
        let mut word = 0u64;
        for &field in Field::ALL.iter() {
            let w = self.width(field) as u64;
            let mask = (1u64 << w) - 1;
            word = (word << w) | (instruction.field(field) as u64 & mask);
        }
        word
    }

    // Inverse of pack() on every declared field. The debug label is
    // not a packed field and comes back empty.
    pub fn unpack(&self, word: u64) -> Instruction {
        let mut rest = word;
        let mut values = [0u32; Field::COUNT];
        for &field in Field::ALL.iter().rev() {
            let w = self.width(field) as u64;
            let mask = (1u64 << w) - 1;
            values[field.index()] = (rest & mask) as u32;
            rest >>= w;
        }

        let mut flags = BitFlags::empty();
        if values[Field::StateCapture.index()] != 0 { flags |= Flag::StateCapture; }
        if values[Field::VarOrTimer.index()]   != 0 { flags |= Flag::VarOrTimer; }
        if values[Field::Branch.index()]       != 0 { flags |= Flag::Branch; }
        if values[Field::ForcedJmp.index()]    != 0 { flags |= Flag::ForcedJmp; }
        if values[Field::Sub.index()]          != 0 { flags |= Flag::Sub; }
        if values[Field::Rtn.index()]          != 0 { flags |= Flag::Rtn; }

        Instruction {
            state_set: values[Field::State.index()],
            state_mask: values[Field::Mask.index()],
            jadr: values[Field::Jadr.index()],
            varsel: values[Field::Varsel.index()],
            timer_sel: values[Field::TimerSel.index()],
            timer_ld: values[Field::TimerLd.index()],
            switch_sel: values[Field::SwitchSel.index()],
            switch_adr: values[Field::SwitchAdr.index()],
            flags,
            label: None,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_word_width() {
        let layout = Layout::default();
        assert_eq!(layout.word_bits(), 24);
        assert_eq!(layout.hex_digits(), 6);
    }

    #[test]
    fn test_pack_places_fields() {
        let layout = Layout::default();

        // A lone RTN bit is the LSB.
        let mut i = Instruction::noop();
        i.flags |= Flag::Rtn;
        assert_eq!(layout.pack(&i), 1);

        // STATE occupies the top three bits of the 24-bit word.
        let i = Instruction::state(0b101, 0);
        assert_eq!(layout.pack(&i) >> 21, 0b101);

        // A branch sets BRANCH and VAR_OR_TIMER, nothing else.
        let mut b = Instruction::branch(2);
        b.jadr = 9;
        let word = layout.pack(&b);
        let back = layout.unpack(word);
        assert!(back.is(Flag::Branch));
        assert!(back.is(Flag::VarOrTimer));
        assert!(!back.is(Flag::ForcedJmp));
        assert_eq!(back.varsel, 2);
        assert_eq!(back.jadr, 9);
    }

    #[test]
    fn test_pack_round_trip() {
        let layout = Layout::default();
        let mut i = Instruction::dispatch(3, 1);
        i.jadr = 17;
        i.state_set = 0b011;
        i.state_mask = 0b111;
        assert_eq!(layout.unpack(layout.pack(&i)), i);

        let j = Instruction::jump(30);
        assert_eq!(layout.unpack(layout.pack(&j)), j);
    }

    #[test]
    fn test_overflow_check() {
        let layout = Layout::default();
        let mut maxima = FieldMaxima::default();
        maxima.observe(Field::Varsel, 16);
        match layout.check(&maxima) {
            Err(Error::FieldOverflow { field, observed, limit }) => {
                assert_eq!(field, Field::Varsel);
                assert_eq!(observed, 16);
                assert_eq!(limit, 3);
            }
            other => panic!("expected overflow, got {:?}", other),
        }
    }

    #[test]
    fn test_widened_layout_passes() {
        let layout = Layout { varsel: 5, ..Layout::default() };
        let mut maxima = FieldMaxima::default();
        maxima.observe(Field::Varsel, 16);
        assert!(layout.check(&maxima).is_ok());
    }
}
