// hotstate: microcode compiler for the hotstate state-machine engine.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

// Debug tool: compile a source file and dump the resolved program as
// one JSON object per instruction.

use std::env::args;
use std::fs;
use std::process::exit;

use serde_json::json;

use hotstate::layout::Layout;
use hotstate::microcode::Flag;
use hotstate::pipeline;


fn main() {
    let path = args().nth(1).expect("no source file given.");
    let source = fs::read_to_string(&path).expect("couldn't read source file");

    let layout = Layout::default();
    let compiled = pipeline::compile_source(&source, &layout, &mut ())
        .unwrap_or_else(|e| {
            eprintln!("listing: {}", e);
            exit(1);
        });

    let digits = layout.hex_digits();
    for (pc, insn) in compiled.code.iter().enumerate() {
        let record = json!({
            "pc": pc,
            "word": format!("{:0w$x}", layout.pack(insn), w = digits),
            "label": insn.label.clone(),
            "state_set": insn.state_set,
            "state_mask": insn.state_mask,
            "jadr": insn.jadr,
            "varsel": insn.varsel,
            "switch_sel": insn.switch_sel,
            "switch_adr": insn.switch_adr,
            "state_capture": insn.is(Flag::StateCapture),
            "var_or_timer": insn.is(Flag::VarOrTimer),
            "branch": insn.is(Flag::Branch),
            "forced_jmp": insn.is(Flag::ForcedJmp),
        });
        println!("{}", record);
    }
}
