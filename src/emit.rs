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

// The emitter: packs the resolved program and writes the memory
// images. Rendering is pure string building so it can be tested and
// byte-compared without touching the filesystem; each file is then
// written whole, in a fixed order.

use std::fmt::Write;
use std::fs;

use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::pipeline::Compiled;
use crate::verilog;


pub struct Images {
    pub smdata: String,
    pub vardata: String,
    pub switchdata: Option<String>,
    pub verilog: String,
}


pub fn render(base: &str, compiled: &Compiled, layout: &Layout) -> Result<Images> {
    // The overflow gate: nothing is packed until every observed
    // field value fits its declared width.
    layout.check(&compiled.maxima)?;

    let digits = layout.hex_digits();
    let mut smdata = String::new();
    for instruction in compiled.code.iter() {
        writeln!(smdata, "{:0w$x}", layout.pack(instruction), w = digits)
            .unwrap();
    }

    // The variable lookup image is the identity mapping.
    let mut vardata = String::new();
    for input in compiled.hardware.inputs.iter() {
        writeln!(vardata, "{:02x}", input.number).unwrap();
    }

    let switchdata = if compiled.switches.is_empty() {
        None
    } else {
        let mut data = String::new();
        for word in compiled.switches.words() {
            writeln!(data, "{:08x}", word).unwrap();
        }
        Some(data)
    };

    let verilog = verilog::wrapper(base, compiled, layout);

    Ok(Images { smdata, vardata, switchdata, verilog })
}


pub fn write(base: &str, images: &Images) -> Result<()> {
    write_file(&format!("{}_smdata.mem", base), &images.smdata)?;
    write_file(&format!("{}_vardata.mem", base), &images.vardata)?;
    if let Some(switchdata) = &images.switchdata {
        write_file(&format!("{}_switchdata.mem", base), switchdata)?;
    }
    write_file(&format!("{}.v", base), &images.verilog)
}


fn write_file(path: &str, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|cause| Error::Io {
        path: String::from(path),
        cause,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Field;
    use crate::pipeline::{self, Compiled};

    fn compile_str(src: &str) -> Compiled {
        pipeline::compile_source(src, &Layout::default(), &mut ()).unwrap()
    }

    const SELECTOR: &str = "\
        int state0 = 0; int state1 = 0; int state2 = 0; int case_in;\n\
        int main() {\n\
            switch (case_in) {\n\
            case 0: state1 = 0; state2 = 0; break;\n\
            case 1: state1 = 0; state2 = 1; break;\n\
            case 2: state1 = 1; state2 = 0; break;\n\
            case 3: state1 = 1; state2 = 1; break;\n\
            default: state1 = 0; state2 = 0; state0 = 0;\n\
            }\n\
        }\n";

    #[test]
    fn test_image_shapes() {
        let layout = Layout::default();
        let compiled = compile_str(SELECTOR);
        let images = render("demo", &compiled, &layout).unwrap();

        // One six-digit word per instruction.
        let lines: Vec<&str> = images.smdata.lines().collect();
        assert_eq!(lines.len(), compiled.code.len());
        assert!(lines.iter().all(|l| l.len() == 6));
        assert!(lines.iter().all(|l| {
            l.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase())
        }));

        // Identity variable map, one byte per input.
        assert_eq!(images.vardata, "00\n");

        // One full bank of 32-bit words.
        let switchdata = images.switchdata.as_ref().unwrap();
        let entries: Vec<&str> = switchdata.lines().collect();
        assert_eq!(entries.len(), 256);
        assert_eq!(entries[0], "00000001");
        assert_eq!(entries[3], "00000007");
        assert_eq!(entries[4], "00000009");
        assert_eq!(entries[255], "00000009");

        assert!(images.verilog.contains("module demo_top"));
        assert!(images.verilog.contains("demo_smdata.mem"));
        assert!(images.verilog.contains("demo_switchdata.mem"));
    }

    #[test]
    fn test_no_switchdata_without_switches() {
        let compiled = compile_str(
            "int s0 = 0; int main() { s0 = 1; }"
        );
        let images = render("plain", &compiled, &Layout::default()).unwrap();
        assert!(images.switchdata.is_none());
        assert!(!images.verilog.contains("plain_switchdata.mem"));
    }

    #[test]
    fn test_packed_words_round_trip() {
        let layout = Layout::default();
        let compiled = compile_str(SELECTOR);
        for instruction in compiled.code.iter() {
            let mut expected = instruction.clone();
            expected.label = None;
            assert_eq!(layout.unpack(layout.pack(instruction)), expected);
        }
    }

    #[test]
    fn test_determinism() {
        let layout = Layout::default();
        let a = render("demo", &compile_str(SELECTOR), &layout).unwrap();
        let b = render("demo", &compile_str(SELECTOR), &layout).unwrap();
        assert_eq!(a.smdata, b.smdata);
        assert_eq!(a.vardata, b.vardata);
        assert_eq!(a.switchdata, b.switchdata);
        assert_eq!(a.verilog, b.verilog);
    }

    #[test]
    fn test_varsel_overflow_reports_field() {
        // Seventeen inputs cannot be addressed by the stock two-bit
        // VARSEL.
        let compiled = compile_str(
            "bool keys[17]; int s0 = 1;\n\
             int main() { if (keys[0]) s0 = 1; }"
        );
        match render("wide", &compiled, &Layout::default()) {
            Err(Error::FieldOverflow { field, observed, limit }) => {
                assert_eq!(field, Field::Varsel);
                assert_eq!(observed, 16);
                assert_eq!(limit, 3);
            }
            other => panic!("expected overflow, got {:?}",
                            other.map(|_| ())),
        }
    }

    #[test]
    fn test_widened_layout_recovers() {
        let compiled = compile_str(
            "bool keys[17]; int s0 = 1;\n\
             int main() { if (keys[0]) s0 = 1; }"
        );
        let layout = Layout { varsel: 5, ..Layout::default() };
        assert!(render("wide", &compiled, &layout).is_ok());
    }
}
