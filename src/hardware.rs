// Hardware analysis: the first pipeline stage.
//
// Walks the declaration-bearing parts of the AST and splits the
// globals into state outputs (initialized) and external inputs
// (uninitialized). Names are interned into an index map here, once;
// every later stage works with integer state/input numbers.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::ast::{Item, Program, Stmt, StmtKind, TypeTag, VarDecl};
use crate::diag::Diag;
use crate::error::{Error, Result};


// State masks are u32 bitfields, so that is the ceiling on state
// numbers.
const MAX_STATE_BITS: u32 = 32;


// A bit the engine drives on a hardware pin.
#[derive(Clone, Debug, PartialEq)]
pub struct StateVar {
    pub name: String,
    pub number: u32,
    pub initial: bool,
}


// A bit the engine samples from outside.
#[derive(Clone, Debug, PartialEq)]
pub struct InputVar {
    pub name: String,
    pub number: u32,
}


// Index entry: which table a name landed in, and where.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Binding {
    State(usize),
    Input(usize),
}


#[derive(Clone, Debug, Default)]
pub struct Hardware {
    pub states: Vec<StateVar>,
    pub inputs: Vec<InputVar>,
    index: HashMap<String, Binding>,
    numbers: HashSet<u32>,
}


impl Hardware {
    pub fn binding(&self, name: &str) -> Option<Binding> {
        self.index.get(name).copied()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    // Input numbers are dense, so the highest is count - 1.
    pub fn max_input_number(&self) -> u32 {
        self.inputs.len().saturating_sub(1) as u32
    }

    // One bit per declared state, at its state number.
    pub fn state_mask_all(&self) -> u32 {
        self.states.iter().fold(0, |m, s| m | (1 << s.number))
    }

    // Width of the state vector: one past the highest state number.
    pub fn state_bits(&self) -> u32 {
        self.states.iter().map(|s| s.number + 1).max().unwrap_or(0)
    }

    fn add_state(
        &mut self,
        name: String,
        number: Option<u32>,
        initial: bool,
        pos: usize,
    ) -> Result<()> {
        let number = match number {
            Some(n) => n,
            None => self.lowest_unused_number(),
        };
        if number >= MAX_STATE_BITS {
            return Err(Error::unsupported(
                format!("state `{}` needs bit {}, past the supported {}",
                        name, number, MAX_STATE_BITS - 1),
                pos,
            ));
        }
        if !self.numbers.insert(number) {
            return Err(Error::DuplicateStateNumber { name, number });
        }
        if self.index.contains_key(&name) {
            return Err(Error::NameCollision { name });
        }
        self.index.insert(name.clone(), Binding::State(self.states.len()));
        self.states.push(StateVar { name, number, initial });
        Ok(())
    }

    fn add_input(&mut self, name: String) -> Result<()> {
        if self.index.contains_key(&name) {
            return Err(Error::NameCollision { name });
        }
        let number = self.inputs.len() as u32;
        self.index.insert(name.clone(), Binding::Input(self.inputs.len()));
        self.inputs.push(InputVar { name, number });
        Ok(())
    }

    fn lowest_unused_number(&self) -> u32 {
        (0..).find(|n| !self.numbers.contains(n)).unwrap()
    }
}


pub fn analyze(program: &Program, diag: &mut dyn Diag) -> Result<Hardware> {
    let mut hw = Hardware::default();
    for item in program.items.iter() {
        match item {
            Item::Vars(decls) => {
                for decl in decls.iter() {
                    declare(&mut hw, decl, diag)?;
                }
            }
            Item::Func(f) => walk_stmt(&mut hw, &f.body, diag)?,
        }
    }
    Ok(hw)
}


// Visit the nodes that can hold declarations; expression subtrees
// cannot, so they are never entered.
fn walk_stmt(hw: &mut Hardware, stmt: &Stmt, diag: &mut dyn Diag) -> Result<()> {
    match &stmt.kind {
        StmtKind::Block(stmts) => {
            for s in stmts.iter() {
                walk_stmt(hw, s, diag)?;
            }
            Ok(())
        }
        StmtKind::Decl(decls) => {
            for decl in decls.iter() {
                declare(hw, decl, diag)?;
            }
            Ok(())
        }
        StmtKind::If(_, then, other) => {
            walk_stmt(hw, then, diag)?;
            if let Some(other) = other {
                walk_stmt(hw, other, diag)?;
            }
            Ok(())
        }
        StmtKind::While(_, body) => walk_stmt(hw, body, diag),
        StmtKind::For(init, _, _, body) => {
            if let Some(init) = init {
                walk_stmt(hw, init, diag)?;
            }
            walk_stmt(hw, body, diag)
        }
        StmtKind::Switch(_, cases) => {
            for case in cases.iter() {
                for s in case.body.iter() {
                    walk_stmt(hw, s, diag)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}


fn declare(hw: &mut Hardware, decl: &VarDecl, diag: &mut dyn Diag) -> Result<()> {
    match decl.ty {
        TypeTag::Int | TypeTag::Bool | TypeTag::Char => (),
        TypeTag::BitInt(_) => {
            diag.note(&format!("ignoring _BitInt declaration `{}`", decl.name));
            return Ok(());
        }
    }

    let initial = decl.init.as_ref().map(truthy);

    match decl.dim {
        Some(dim) if dim > 0 => {
            for i in 0..dim {
                let name = format!("{}[{}]", decl.name, i);
                match initial {
                    Some(v) => hw.add_state(name, Some(i), v, decl.pos)?,
                    None => hw.add_input(name)?,
                }
            }
            Ok(())
        }
        _ => match initial {
            Some(v) => {
                let number = suffix_number(&decl.name);
                hw.add_state(decl.name.clone(), number, v, decl.pos)
            }
            None => hw.add_input(decl.name.clone()),
        },
    }
}


// The initializer's boolean view: literals mean what they say,
// anything else powers up low.
fn truthy(init: &crate::ast::Expr) -> bool {
    use crate::ast::Expr;
    match init {
        Expr::Bool(b) => *b,
        Expr::Number(n) => *n != 0,
        _ => false,
    }
}


// A trailing run of digits in the name picks the state number:
// `LED0` lands on bit 0, `state12` on bit 12.
fn suffix_number(name: &str) -> Option<u32> {
    lazy_static! {
        static ref SUFFIX: Regex = Regex::new("([0-9]+)$").unwrap();
    }
    SUFFIX
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
