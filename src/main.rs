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

use std::env::args;
use std::fs;
use std::process::exit;

use hotstate::diag::{Diag, Stderr};
use hotstate::emit;
use hotstate::error::Error;
use hotstate::layout::Layout;
use hotstate::pipeline;


fn main() {
    let mut argv: Vec<String> = args().skip(1).collect();
    let verbose = argv.iter().any(|a| a == "-v");
    argv.retain(|a| a != "-v");

    if argv.len() < 2 || argv.len() > 3 {
        eprintln!("usage: hotstate [-v] <source.c> <out-base> [layout.ron]");
        exit(2);
    }
    let source_path = &argv[0];
    let base = &argv[1];

    let layout = match argv.get(2) {
        Some(path) => Layout::load(path).unwrap_or_else(|e| die(&e, None)),
        None => Layout::default(),
    };

    let source = match fs::read_to_string(source_path) {
        Ok(source) => source,
        Err(cause) => die(
            &Error::Io { path: source_path.clone(), cause },
            None,
        ),
    };

    let mut quiet = ();
    let mut loud = Stderr;
    let diag: &mut dyn Diag = if verbose { &mut loud } else { &mut quiet };

    let compiled = pipeline::compile_source(&source, &layout, diag)
        .unwrap_or_else(|e| die(&e, Some(&source)));
    let images = emit::render(base, &compiled, &layout)
        .unwrap_or_else(|e| die(&e, Some(&source)));
    emit::write(base, &images).unwrap_or_else(|e| die(&e, None));

    println!(
        "{}: {} instructions, {} states, {} inputs -> {}_smdata.mem",
        source_path,
        compiled.code.len(),
        compiled.hardware.state_count(),
        compiled.hardware.input_count(),
        base
    );
}


fn die(error: &Error, source: Option<&str>) -> ! {
    match source.and_then(|src| error.position().map(|at| (src, at))) {
        Some((src, at)) => {
            let (line, column) = line_col(src, at);
            eprintln!("hotstate: {}:{}: {}", line, column, error);
        }
        None => eprintln!("hotstate: {}", error),
    }
    exit(1);
}


// 1-based line and column of a byte offset.
fn line_col(source: &str, at: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if i >= at {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}
