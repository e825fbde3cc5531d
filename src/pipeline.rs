// The compilation session: one in-order pass over the stages.
//
// analyze -> lower -> resolve, then fold in the width floors the
// hardware itself imposes. Everything is synchronous and owned here;
// the emitter consumes the result and writes files.

use crate::ast::Program;
use crate::diag::Diag;
use crate::error::Result;
use crate::hardware::{self, Hardware};
use crate::layout::{Field, Layout};
use crate::lower;
use crate::microcode::{FieldMaxima, Instruction, SwitchTable};
use crate::parser;
use crate::resolve;


pub struct Compiled {
    pub hardware: Hardware,
    pub code: Vec<Instruction>,
    pub switches: SwitchTable,
    pub maxima: FieldMaxima,
}


pub fn compile(
    program: &Program,
    layout: &Layout,
    diag: &mut dyn Diag,
) -> Result<Compiled> {
    let hw = hardware::analyze(program, diag)?;
    diag.note(&format!(
        "{} state outputs, {} inputs",
        hw.state_count(),
        hw.input_count()
    ));

    let mut lowered = lower::lower_program(program, &hw, layout, diag)?;
    resolve::resolve(&mut lowered)?;

    // The images impose width floors independent of which bits the
    // program touches: the vardata image addresses every input, and
    // the state vector spans every declared state.
    if hw.input_count() > 0 {
        lowered.maxima.observe(Field::Varsel, hw.max_input_number());
    }
    let mask = hw.state_mask_all();
    if mask != 0 {
        lowered.maxima.observe(Field::State, mask);
        lowered.maxima.observe(Field::Mask, mask);
    }

    diag.note(&format!(
        "{} instructions, {} switch banks",
        lowered.code.len(),
        lowered.switches.bank_count()
    ));

    Ok(Compiled {
        hardware: hw,
        code: lowered.code,
        switches: lowered.switches,
        maxima: lowered.maxima,
    })
}


pub fn compile_source(
    source: &str,
    layout: &Layout,
    diag: &mut dyn Diag,
) -> Result<Compiled> {
    compile(&parser::parse(source)?, layout, diag)
}
