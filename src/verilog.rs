// Emits the Verilog wrapper that instantiates the hotstate engine
// with the freshly written memory images.

use std::fmt::Write;

use crate::layout::Layout;
use crate::pipeline::Compiled;


// Verilog identifiers are stricter than file names.
fn identifier(base: &str) -> String {
    let stem = base
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(base);
    let mut id: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if id.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true) {
        id.insert(0, '_');
    }
    id
}


pub fn wrapper(base: &str, compiled: &Compiled, layout: &Layout) -> String {
    let name = identifier(base);
    let input_count = compiled.hardware.input_count().max(1);
    let state_bits = compiled.hardware.state_bits().max(1);
    let switch_words = compiled.switches.words().count();
    let switch_file = if switch_words > 0 {
        format!("{}_switchdata.mem", base)
    } else {
        String::new()
    };

    let mut v = String::new();
    let out = &mut v;
    writeln!(out, "// Generated by hotstate. Do not edit.").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "`timescale 1ns / 1ps").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "module {}_top (", name).unwrap();
    writeln!(out, "    input  wire clk,").unwrap();
    writeln!(out, "    input  wire rst,").unwrap();
    writeln!(out, "    input  wire [{}:0] var_in,", input_count - 1).unwrap();
    writeln!(out, "    output wire [{}:0] state_out", state_bits - 1).unwrap();
    writeln!(out, ");").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "    hotstate_engine #(").unwrap();
    writeln!(out, "        .WORD_BITS({}),", layout.word_bits()).unwrap();
    writeln!(out, "        .CODE_WORDS({}),", compiled.code.len()).unwrap();
    writeln!(out, "        .VAR_WORDS({}),", input_count).unwrap();
    writeln!(out, "        .SWITCH_WORDS({}),", switch_words).unwrap();
    writeln!(out, "        .CODE_FILE(\"{}_smdata.mem\"),", base).unwrap();
    writeln!(out, "        .VAR_FILE(\"{}_vardata.mem\"),", base).unwrap();
    writeln!(out, "        .SWITCH_FILE(\"{}\")", switch_file).unwrap();
    writeln!(out, "    ) engine (").unwrap();
    writeln!(out, "        .clk(clk),").unwrap();
    writeln!(out, "        .rst(rst),").unwrap();
    writeln!(out, "        .var_in(var_in),").unwrap();
    writeln!(out, "        .state_out(state_out)").unwrap();
    writeln!(out, "    );").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "endmodule").unwrap();
    v
}
