// (C) 2020 Brandon Lewis
//
// Lowering from the statement tree to flat microcode.
//
// This is the middle of the pipeline: it consumes main's body plus
// the hardware context and produces the unresolved instruction
// array, the pending-jump list, the loop/switch frame records, and
// the switch-dispatch table.
//
// *Control flow*
//
// The engine's conditional branch is taken when the selected input
// reads 1, so a condition lowers to "jumping code": each leaf test
// emits a branch (the true exit) followed by a forced jump (the
// false exit), and the logical operators thread or swap those exit
// lists to get short-circuit evaluation. Exits are backpatched as
// their targets become known; exits whose target is a loop or switch
// boundary become pending jumps against the innermost frame and are
// settled by the resolver.
//
// *State writes*
//
// An assignment must name a state bit and carry a constant
// right-hand side; it becomes a single state-capture word. A run of
// consecutive assignments in one block folds into one word, later
// writes to the same bit winning. Anything the engine cannot
// perform, like arithmetic on a non-constant, is rejected here
// rather than dropped.
//
// *Switch*
//
// Each switch statement owns one bank of the switch memory. The
// dispatch word is emitted ahead of the case bodies; explicit case
// values claim bank entries as their bodies are placed, the default
// body fills whatever remains when the frame pops, and a bank with
// no default sends unclaimed values past the switch. Case bodies
// fall through unless they break.

use crate::ast::{
    BinOp, Case, Expr, Function, Item, LValue, Node, Program, Stmt,
    StmtKind, TypeTag, UnOp, VarDecl,
};
use crate::diag::Diag;
use crate::error::{Error, Result};
use crate::hardware::{Binding, Hardware};
use crate::layout::{Field, Layout};
use crate::microcode::{
    FieldMaxima, FrameKind, FrameRecord, Instruction, JumpKind, Lowered,
    PendingJump, SwitchTable, UNFILLED,
};


// Exit lists of a partially lowered condition: instruction indices
// whose jadr still needs the true (resp. false) target.
struct Exits {
    truthy: Vec<usize>,
    falsy: Vec<usize>,
}


struct Lowerer<'a> {
    hw: &'a Hardware,
    diag: &'a mut dyn Diag,
    code: Vec<Instruction>,
    pending: Vec<PendingJump>,
    frames: Vec<FrameRecord>,
    stack: Vec<usize>,
    switches: SwitchTable,
    maxima: FieldMaxima,
    next_label: Option<String>,
}


pub fn lower_program(
    program: &Program,
    hw: &Hardware,
    layout: &Layout,
    diag: &mut dyn Diag,
) -> Result<Lowered> {
    let mut main: Option<&Function> = None;
    for item in program.items.iter() {
        if let Item::Func(f) = item {
            if f.name == "main" {
                if main.is_none() {
                    main = Some(f);
                }
            } else {
                diag.note(&format!("ignoring body of function `{}`", f.name));
            }
        }
    }
    let main = main.ok_or_else(|| Error::UnsupportedConstruct {
        what: String::from("no `main` function to lower"),
        at: None,
    })?;

    let mut lowerer = Lowerer {
        hw,
        diag,
        code: Vec::new(),
        pending: Vec::new(),
        frames: Vec::new(),
        stack: Vec::new(),
        switches: SwitchTable::new(layout.switch_offset_bits),
        maxima: FieldMaxima::default(),
        next_label: None,
    };
    lowerer.lower_stmt(&main.body)?;
    debug_assert!(lowerer.stack.is_empty());

    Ok(Lowered {
        code: lowerer.code,
        pending: lowerer.pending,
        frames: lowerer.frames,
        switches: lowerer.switches,
        maxima: lowerer.maxima,
    })
}


impl<'a> Lowerer<'a> {
    // Append an instruction, returning its address.
    fn emit(&mut self, mut instruction: Instruction) -> usize {
        if let Some(label) = self.next_label.take() {
            instruction.label = Some(label);
        }
        self.maxima.observe_instruction(&instruction);
        self.code.push(instruction);
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    fn label_next(&mut self, label: String) {
        self.next_label = Some(label);
    }

    fn patch(&mut self, at: usize, target: usize) {
        self.code[at].jadr = target as u32;
        self.maxima.observe(Field::Jadr, target as u32);
    }

    fn patch_all(&mut self, exits: &[usize], target: usize) {
        for &at in exits {
            self.patch(at, target);
        }
    }

    fn defer(&mut self, at: usize, kind: JumpKind) {
        self.pending.push(PendingJump { index: at, kind });
    }

    fn defer_all(&mut self, exits: &[usize], kind: JumpKind) {
        for &at in exits {
            self.defer(at, kind);
        }
    }

    fn push_frame(&mut self, kind: FrameKind, continue_target: Option<u32>) -> usize {
        let fid = self.frames.len();
        self.frames.push(FrameRecord {
            kind,
            continue_target,
            break_target: None,
        });
        self.stack.push(fid);
        fid
    }

    // The current address becomes the frame's break target.
    fn pop_frame(&mut self, fid: usize) {
        let top = self.stack.pop();
        debug_assert_eq!(top, Some(fid));
        self.frames[fid].break_target = Some(self.here() as u32);
    }

    /*** statements ***********************************************/

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Block(stmts) => self.lower_block(stmts),

            StmtKind::Assign(..) | StmtKind::Decl(..) | StmtKind::Empty => {
                self.assign_run(std::slice::from_ref(stmt)).map(|_| ())
            }

            StmtKind::If(cond, then, other) => {
                self.lower_if(cond, then, other.as_ref(), stmt.pos)
            }

            StmtKind::While(cond, body) => {
                self.lower_while(cond, body, stmt.pos)
            }

            StmtKind::For(init, cond, update, body) => {
                self.lower_for(
                    init.as_ref(), cond.as_ref(), update.as_ref(), body,
                    stmt.pos,
                )
            }

            StmtKind::Switch(scrutinee, cases) => {
                self.lower_switch(scrutinee, cases, stmt.pos)
            }

            StmtKind::Break => {
                let fid = match self.stack.last() {
                    Some(&fid) => fid,
                    None => return Err(Error::unsupported(
                        String::from("`break` outside of a loop or switch"),
                        stmt.pos,
                    )),
                };
                let j = self.emit(Instruction::jump_unresolved());
                self.defer(j, JumpKind::Break(fid));
                Ok(())
            }

            StmtKind::Continue => {
                let fid = self.stack.iter().rev().copied()
                    .find(|&f| self.frames[f].kind != FrameKind::Switch);
                let fid = match fid {
                    Some(fid) => fid,
                    None => return Err(Error::unsupported(
                        String::from("`continue` outside of a loop"),
                        stmt.pos,
                    )),
                };
                let j = self.emit(Instruction::jump_unresolved());
                self.defer(j, JumpKind::Continue(fid));
                Ok(())
            }

            StmtKind::Return(_) => {
                let j = self.emit(Instruction::jump_unresolved());
                self.defer(j, JumpKind::Exit);
                Ok(())
            }

            StmtKind::Expr(_) => {
                self.diag.note("expression statement has no effect; dropped");
                Ok(())
            }
        }
    }

    fn lower_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        let mut i = 0;
        while i < stmts.len() {
            let taken = self.assign_run(&stmts[i..])?;
            if taken > 0 {
                i += taken;
            } else {
                self.lower_stmt(&stmts[i])?;
                i += 1;
            }
        }
        Ok(())
    }

    // Fold a run of consecutive state writes into one capture word.
    // Returns how many statements were consumed.
    fn assign_run(&mut self, stmts: &[Stmt]) -> Result<usize> {
        let mut set = 0u32;
        let mut mask = 0u32;
        let mut taken = 0;
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Assign(lvalue, rhs) => {
                    let (bit, on) = self.assign_bits(lvalue, rhs, stmt.pos)?;
                    mask |= 1 << bit;
                    if on {
                        set |= 1 << bit;
                    } else {
                        set &= !(1 << bit);
                    }
                }
                StmtKind::Decl(decls) => {
                    for decl in decls.iter() {
                        for (bit, on) in self.decl_bits(decl, stmt.pos)? {
                            mask |= 1 << bit;
                            if on {
                                set |= 1 << bit;
                            } else {
                                set &= !(1 << bit);
                            }
                        }
                    }
                }
                StmtKind::Empty => (),
                _ => break,
            }
            taken += 1;
        }
        if mask != 0 {
            self.emit(Instruction::state(set, mask));
        }
        Ok(taken)
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then: &Stmt,
        other: Option<&Node<Stmt>>,
        pos: usize,
    ) -> Result<()> {
        match const_value(cond) {
            Some(v) if v != 0 => self.lower_stmt(then),
            Some(_) => match other {
                Some(other) => self.lower_stmt(other),
                None => Ok(()),
            },
            None => {
                let exits = self.lower_cond(cond, pos)?;
                let then_start = self.here();
                self.patch_all(&exits.truthy, then_start);
                self.lower_stmt(then)?;
                match other {
                    None => {
                        let after = self.here();
                        self.patch_all(&exits.falsy, after);
                    }
                    Some(other) => {
                        let skip = self.emit(Instruction::jump_unresolved());
                        let else_start = self.here();
                        self.patch_all(&exits.falsy, else_start);
                        self.lower_stmt(other)?;
                        let after = self.here();
                        self.defer(skip, JumpKind::Direct(after));
                    }
                }
                Ok(())
            }
        }
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stmt, pos: usize) -> Result<()> {
        let top = self.here();
        let fid = self.push_frame(FrameKind::While, Some(top as u32));
        match const_value(cond) {
            // while(0): the body can never run.
            Some(0) => (),
            Some(_) => {
                self.label_next(format!("loop_{}", fid));
                self.lower_stmt(body)?;
                self.emit(Instruction::jump(top as u32));
            }
            None => {
                self.label_next(format!("loop_{}", fid));
                let exits = self.lower_cond(cond, pos)?;
                let body_start = self.here();
                self.patch_all(&exits.truthy, body_start);
                self.defer_all(&exits.falsy, JumpKind::Break(fid));
                self.lower_stmt(body)?;
                self.emit(Instruction::jump(top as u32));
            }
        }
        self.pop_frame(fid);
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: Option<&Node<Stmt>>,
        cond: Option<&Expr>,
        update: Option<&Node<Stmt>>,
        body: &Stmt,
        pos: usize,
    ) -> Result<()> {
        if let Some(init) = init {
            self.lower_stmt(init)?;
        }
        let top = self.here();
        let fid = self.push_frame(FrameKind::For, None);
        // An absent condition is an unconditional loop.
        let folded = match cond {
            Some(c) => const_value(c),
            None => Some(1),
        };
        match folded {
            Some(0) => (),
            Some(_) => {
                self.label_next(format!("loop_{}", fid));
                self.lower_stmt(body)?;
                self.finish_loop(fid, top, update)?;
            }
            None => {
                self.label_next(format!("loop_{}", fid));
                let exits = self.lower_cond(cond.unwrap(), pos)?;
                let body_start = self.here();
                self.patch_all(&exits.truthy, body_start);
                self.defer_all(&exits.falsy, JumpKind::Break(fid));
                self.lower_stmt(body)?;
                self.finish_loop(fid, top, update)?;
            }
        }
        self.pop_frame(fid);
        Ok(())
    }

    // Place the update, fix the frame's continue target, and close
    // the back edge. Continue in a for-loop goes to the update, not
    // the top.
    fn finish_loop(
        &mut self,
        fid: usize,
        top: usize,
        update: Option<&Node<Stmt>>,
    ) -> Result<()> {
        let update_addr = self.here();
        if let Some(update) = update {
            self.lower_stmt(update)?;
        }
        self.frames[fid].continue_target = Some(match update {
            Some(_) => update_addr as u32,
            None => top as u32,
        });
        self.emit(Instruction::jump(top as u32));
        Ok(())
    }

    fn lower_switch(
        &mut self,
        scrutinee: &Expr,
        cases: &[Case],
        pos: usize,
    ) -> Result<()> {
        let fid = self.push_frame(FrameKind::Switch, None);
        match const_value(scrutinee) {
            Some(v) => self.lower_switch_const(v, cases, fid),
            None => {
                let sel = match self.input_selector(scrutinee, pos) {
                    Ok(sel) => sel,
                    Err(_) => return Err(Error::unsupported(
                        String::from(
                            "switch scrutinee must name an input or be constant"
                        ),
                        pos,
                    )),
                };
                self.lower_switch_dispatch(sel, cases, fid)
            }
        }
    }

    fn lower_switch_dispatch(
        &mut self,
        sel: u32,
        cases: &[Case],
        fid: usize,
    ) -> Result<()> {
        let bank = self.switches.allocate();
        self.label_next(format!("switch_{}", bank));
        let dispatch = self.emit(Instruction::dispatch(bank as u32, sel));
        // Falling off the final case behaves as break.
        self.defer(dispatch, JumpKind::Break(fid));

        let size = self.switches.bank_size() as i64;
        let mut default_addr: Option<u32> = None;
        for case in cases {
            let addr = self.here() as u32;
            match case.value {
                Some(v) => {
                    if v < 0 || v >= size {
                        return Err(Error::unsupported(
                            format!(
                                "case value {} does not fit a {}-entry \
                                 switch bank",
                                v, size
                            ),
                            case.pos,
                        ));
                    }
                    if self.switches.get(bank, v as usize) != UNFILLED {
                        return Err(Error::unsupported(
                            format!("duplicate case value {}", v),
                            case.pos,
                        ));
                    }
                    self.switches.set(bank, v as usize, addr);
                    self.label_next(format!("case_{}", v));
                }
                None => {
                    if default_addr.is_some() {
                        return Err(Error::unsupported(
                            String::from("more than one default case"),
                            case.pos,
                        ));
                    }
                    default_addr = Some(addr);
                    self.label_next(String::from("default"));
                }
            }
            self.lower_block(&case.body)?;
        }
        self.pop_frame(fid);

        // Unclaimed values go to the default body, or past the
        // switch when there is none. Explicit cases always win, even
        // against a default written above them.
        let fallback = default_addr.unwrap_or(self.here() as u32);
        self.switches.fill_unfilled(bank, fallback);
        Ok(())
    }

    // A constant scrutinee needs no bank: the winning case is known
    // now. Bodies are still placed in order so fall-through works.
    fn lower_switch_const(
        &mut self,
        value: i64,
        cases: &[Case],
        fid: usize,
    ) -> Result<()> {
        let entry = self.emit(Instruction::jump_unresolved());
        let mut seen: Vec<i64> = Vec::new();
        let mut target: Option<usize> = None;
        let mut default_addr: Option<usize> = None;
        for case in cases {
            let addr = self.here();
            match case.value {
                Some(v) => {
                    if seen.contains(&v) {
                        return Err(Error::unsupported(
                            format!("duplicate case value {}", v),
                            case.pos,
                        ));
                    }
                    seen.push(v);
                    if v == value {
                        target = Some(addr);
                    }
                }
                None => {
                    if default_addr.is_some() {
                        return Err(Error::unsupported(
                            String::from("more than one default case"),
                            case.pos,
                        ));
                    }
                    default_addr = Some(addr);
                }
            }
            self.lower_block(&case.body)?;
        }
        self.pop_frame(fid);
        let dest = target.or(default_addr).unwrap_or_else(|| self.here());
        self.defer(entry, JumpKind::Direct(dest));
        Ok(())
    }

    /*** conditions ***********************************************/

    // Lower a condition to jumping code, returning its exit lists.
    fn lower_cond(&mut self, expr: &Expr, pos: usize) -> Result<Exits> {
        // A constant operand inside && or || reduces to a bare jump.
        if let Some(v) = const_value(expr) {
            let j = self.emit(Instruction::jump_unresolved());
            return Ok(if v != 0 {
                Exits { truthy: vec![j], falsy: vec![] }
            } else {
                Exits { truthy: vec![], falsy: vec![j] }
            });
        }

        match expr {
            Expr::Id(_) | Expr::Index(..) => {
                let sel = self.input_selector(expr, pos)?;
                Ok(self.bit_test(sel))
            }

            Expr::Unary(UnOp::Not, inner) => {
                let exits = self.lower_cond(inner, pos)?;
                Ok(Exits { truthy: exits.falsy, falsy: exits.truthy })
            }

            // Short-circuit: a's true exits fall into b; either
            // side's false exits exit the whole condition. Bitwise
            // and/or on single-bit inputs read the same.
            Expr::Binary(BinOp::And, a, b)
            | Expr::Binary(BinOp::BitAnd, a, b) => {
                let ea = self.lower_cond(a, pos)?;
                let b_start = self.here();
                self.patch_all(&ea.truthy, b_start);
                let eb = self.lower_cond(b, pos)?;
                let mut falsy = ea.falsy;
                falsy.extend(eb.falsy);
                Ok(Exits { truthy: eb.truthy, falsy })
            }

            Expr::Binary(BinOp::Or, a, b)
            | Expr::Binary(BinOp::BitOr, a, b) => {
                let ea = self.lower_cond(a, pos)?;
                let b_start = self.here();
                self.patch_all(&ea.falsy, b_start);
                let eb = self.lower_cond(b, pos)?;
                let mut truthy = ea.truthy;
                truthy.extend(eb.truthy);
                Ok(Exits { truthy, falsy: eb.falsy })
            }

            Expr::Binary(op, a, b) if is_compare(*op) => {
                self.lower_compare(*op, a, b, pos)
            }

            Expr::Unary(UnOp::Neg, _) | Expr::Binary(..) => {
                Err(Error::condition(
                    String::from(
                        "arithmetic has no runtime value; conditions test \
                         input bits"
                    ),
                    pos,
                ))
            }

            _ => Err(Error::condition(
                String::from("condition shape is not supported"),
                pos,
            )),
        }
    }

    // One input bit: branch on it, then jump. The branch is the true
    // exit and the jump the false exit.
    fn bit_test(&mut self, sel: u32) -> Exits {
        let b = self.emit(Instruction::branch(sel));
        let j = self.emit(Instruction::jump_unresolved());
        Exits { truthy: vec![b], falsy: vec![j] }
    }

    fn lower_compare(
        &mut self,
        op: BinOp,
        a: &Expr,
        b: &Expr,
        pos: usize,
    ) -> Result<Exits> {
        let (input, constant, op) = match (const_value(a), const_value(b)) {
            (None, Some(n)) => (a, n, op),
            (Some(n), None) => (b, n, flip_compare(op)),
            _ => return Err(Error::condition(
                String::from(
                    "comparison must be between one input and one constant"
                ),
                pos,
            )),
        };
        let sel = self.input_selector(input, pos)?;

        match (op, constant) {
            (BinOp::Eq, 1) | (BinOp::Neq, 0) => Ok(self.bit_test(sel)),
            (BinOp::Eq, 0) | (BinOp::Neq, 1) => {
                let exits = self.bit_test(sel);
                Ok(Exits { truthy: exits.falsy, falsy: exits.truthy })
            }
            // Any other relation reads the input as a multi-bit
            // value and dispatches through a switch bank.
            _ => self.relation_dispatch(sel, op, constant),
        }
    }

    // The switch-dispatch fallback: every scrutinee value routes to
    // a true stub or a false stub, which then join the exit lists.
    fn relation_dispatch(
        &mut self,
        sel: u32,
        op: BinOp,
        constant: i64,
    ) -> Result<Exits> {
        let bank = self.switches.allocate();
        let dispatch = self.emit(Instruction::dispatch(bank as u32, sel));
        let t = self.emit(Instruction::jump_unresolved());
        let f = self.emit(Instruction::jump_unresolved());
        // The bank decides at runtime; the dispatch word's own jadr
        // is only a safe default.
        self.patch(dispatch, f);
        for v in 0..self.switches.bank_size() {
            let holds = compare(v as i64, op, constant);
            let stub = if holds { t } else { f };
            self.switches.set(bank, v, stub as u32);
        }
        Ok(Exits { truthy: vec![t], falsy: vec![f] })
    }

    /*** name resolution ******************************************/

    fn input_selector(&self, expr: &Expr, pos: usize) -> Result<u32> {
        match expr {
            Expr::Id(name) => self.input_by_name(name, pos),
            Expr::Index(name, index) => {
                let i = const_value(index).ok_or_else(|| Error::condition(
                    format!("index into `{}` is not constant", name),
                    pos,
                ))?;
                self.input_by_name(&format!("{}[{}]", name, i), pos)
            }
            _ => Err(Error::condition(
                String::from("expected an input bit"),
                pos,
            )),
        }
    }

    fn input_by_name(&self, name: &str, pos: usize) -> Result<u32> {
        match self.hw.binding(name) {
            Some(Binding::Input(i)) => Ok(self.hw.inputs[i].number),
            Some(Binding::State(_)) => Err(Error::condition(
                format!("`{}` is a state output; conditions read inputs", name),
                pos,
            )),
            None => Err(Error::condition(
                format!("`{}` is not declared", name),
                pos,
            )),
        }
    }

    fn state_bit(&self, name: &str, pos: usize) -> Result<u32> {
        match self.hw.binding(name) {
            Some(Binding::State(i)) => Ok(self.hw.states[i].number),
            Some(Binding::Input(_)) => Err(Error::unsupported(
                format!("`{}` is an input; only states can be assigned", name),
                pos,
            )),
            None => Err(Error::unsupported(
                format!("`{}` is not declared", name),
                pos,
            )),
        }
    }

    fn assign_bits(
        &self,
        lvalue: &LValue,
        rhs: &Expr,
        pos: usize,
    ) -> Result<(u32, bool)> {
        let on = const_value(rhs)
            .ok_or_else(|| Error::unsupported(
                format!(
                    "right-hand side of assignment to `{}` is not constant",
                    lvalue.name
                ),
                pos,
            ))?
            != 0;
        let name = match &lvalue.index {
            None => lvalue.name.clone(),
            Some(index) => {
                let i = const_value(index).ok_or_else(|| Error::unsupported(
                    format!("index into `{}` is not constant", lvalue.name),
                    pos,
                ))?;
                format!("{}[{}]", lvalue.name, i)
            }
        };
        Ok((self.state_bit(&name, pos)?, on))
    }

    // The state bits a declaration's initializer writes when it
    // executes. Inputs and ignored types write nothing.
    fn decl_bits(&self, decl: &VarDecl, pos: usize) -> Result<Vec<(u32, bool)>> {
        if let TypeTag::BitInt(_) = decl.ty {
            return Ok(vec![]);
        }
        let init = match &decl.init {
            Some(init) => init,
            None => return Ok(vec![]),
        };
        let on = const_value(init)
            .ok_or_else(|| Error::unsupported(
                format!("initializer for `{}` is not constant", decl.name),
                pos,
            ))?
            != 0;
        match decl.dim {
            Some(dim) if dim > 0 => (0..dim)
                .map(|i| {
                    self.state_bit(&format!("{}[{}]", decl.name, i), pos)
                        .map(|bit| (bit, on))
                })
                .collect(),
            _ => Ok(vec![(self.state_bit(&decl.name, pos)?, on)]),
        }
    }
}


/*** constant folding *********************************************/

// Fold an expression down to an integer, when it is made purely of
// literals. C semantics: logic yields 0 or 1.
fn const_value(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Number(n) => Some(*n),
        Expr::Bool(b) => Some(*b as i64),
        Expr::Unary(UnOp::Neg, a) => Some(-const_value(a)?),
        Expr::Unary(UnOp::Not, a) => Some((const_value(a)? == 0) as i64),
        Expr::Binary(op, a, b) => {
            let a = const_value(a)?;
            let b = const_value(b)?;
            Some(match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Div => {
                    if b == 0 {
                        return None;
                    }
                    a / b
                }
                BinOp::Lt => (a < b) as i64,
                BinOp::Lte => (a <= b) as i64,
                BinOp::Gt => (a > b) as i64,
                BinOp::Gte => (a >= b) as i64,
                BinOp::Eq => (a == b) as i64,
                BinOp::Neq => (a != b) as i64,
                BinOp::And => (a != 0 && b != 0) as i64,
                BinOp::Or => (a != 0 || b != 0) as i64,
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
            })
        }
        _ => None,
    }
}


fn is_compare(op: BinOp) -> bool {
    match op {
        BinOp::Eq | BinOp::Neq
        | BinOp::Lt | BinOp::Lte
        | BinOp::Gt | BinOp::Gte => true,
        _ => false,
    }
}


// Mirror a comparison so the input lands on the left.
fn flip_compare(op: BinOp) -> BinOp {
    match op {
        BinOp::Lt => BinOp::Gt,
        BinOp::Lte => BinOp::Gte,
        BinOp::Gt => BinOp::Lt,
        BinOp::Gte => BinOp::Lte,
        other => other,
    }
}


fn compare(a: i64, op: BinOp, b: i64) -> bool {
    match op {
        BinOp::Eq => a == b,
        BinOp::Neq => a != b,
        BinOp::Lt => a < b,
        BinOp::Lte => a <= b,
        BinOp::Gt => a > b,
        BinOp::Gte => a >= b,
        _ => false,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware;
    use crate::microcode::{Flag, UNRESOLVED};
    use crate::parser;

    fn lower_str(src: &str) -> Lowered {
        try_lower(src).unwrap()
    }

    fn try_lower(src: &str) -> Result<Lowered> {
        let program = parser::parse(src).unwrap();
        let hw = hardware::analyze(&program, &mut ())?;
        lower_program(&program, &hw, &Layout::default(), &mut ())
    }

    fn back_edges(lowered: &Lowered) -> Vec<usize> {
        lowered.code.iter().enumerate()
            .filter(|(i, insn)| {
                insn.is(Flag::ForcedJmp)
                    && insn.jadr != UNRESOLVED
                    && (insn.jadr as usize) < *i
            })
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_assign_run_merges() {
        let lowered = lower_str(
            "int a = 0; int b = 0; int c = 0;\n\
             int main() { a = 1; b = 1; c = 0; }"
        );
        assert_eq!(lowered.code.len(), 1);
        let insn = &lowered.code[0];
        assert!(insn.is(Flag::StateCapture));
        assert_eq!(insn.state_set, 0b011);
        assert_eq!(insn.state_mask, 0b111);
    }

    #[test]
    fn test_later_write_wins_in_a_run() {
        let lowered = lower_str(
            "int a = 0; int main() { a = 1; a = 0; }"
        );
        assert_eq!(lowered.code.len(), 1);
        assert_eq!(lowered.code[0].state_set, 0);
        assert_eq!(lowered.code[0].state_mask, 1);
    }

    #[test]
    fn test_array_element_assignment() {
        let lowered = lower_str(
            "int leds[3] = 0; int main() { leds[2] = 1; }"
        );
        assert_eq!(lowered.code.len(), 1);
        assert_eq!(lowered.code[0].state_set, 0b100);
        assert_eq!(lowered.code[0].state_mask, 0b100);
    }

    #[test]
    fn test_if_else_shape() {
        let lowered = lower_str(
            "bool s0 = 0; bool a;\n\
             int main() { if (a) s0 = 1; else s0 = 0; }"
        );
        // branch, false jump, then, skip, else
        assert_eq!(lowered.code.len(), 5);
        let b = &lowered.code[0];
        assert!(b.is(Flag::Branch));
        assert!(!b.is(Flag::ForcedJmp));
        assert_eq!(b.varsel, 0);
        assert_eq!(b.jadr, 2);
        assert_eq!(lowered.code[1].jadr, 4);
        assert!(lowered.code[2].is(Flag::StateCapture));
        assert_eq!(
            lowered.pending,
            vec![PendingJump { index: 3, kind: JumpKind::Direct(5) }]
        );
    }

    #[test]
    fn test_while_shape() {
        let lowered = lower_str(
            "bool s0 = 0; bool run;\n\
             int main() { while (run) s0 = 1; }"
        );
        assert_eq!(lowered.code.len(), 4);
        assert_eq!(lowered.code[0].jadr, 2);
        assert_eq!(back_edges(&lowered), vec![3]);
        assert_eq!(lowered.code[3].jadr, 0);
        // The condition's false exit breaks out of the loop.
        assert_eq!(
            lowered.pending,
            vec![PendingJump { index: 1, kind: JumpKind::Break(0) }]
        );
        assert_eq!(lowered.frames[0].break_target, Some(4));
        assert_eq!(lowered.frames[0].continue_target, Some(0));
    }

    #[test]
    fn test_while_true_emits_no_condition() {
        let lowered = lower_str("int main() { while (1) { } }");
        assert_eq!(lowered.code.len(), 1);
        assert!(lowered.code[0].is(Flag::ForcedJmp));
        assert_eq!(lowered.code[0].jadr, 0);
        assert!(lowered.pending.is_empty());
    }

    #[test]
    fn test_while_false_emits_nothing() {
        let lowered = lower_str(
            "int s0 = 0; int main() { while (0) s0 = 1; }"
        );
        assert!(lowered.code.is_empty());
    }

    #[test]
    fn test_short_circuit_and() {
        let lowered = lower_str(
            "bool s0 = 0; bool a0, a1;\n\
             int main() { if (a0 == 0 && a1 == 1) s0 = 1; }"
        );
        // !a0: branch@0/jump@1 with exits swapped; a1: branch@2/jump@3;
        // body@4.
        assert_eq!(lowered.code.len(), 5);
        // a0's branch is the false exit, patched past the body.
        assert_eq!(lowered.code[0].jadr, 5);
        // a0's jump is the true exit, falling into a1's test.
        assert_eq!(lowered.code[1].jadr, 2);
        assert_eq!(lowered.code[2].jadr, 4);
        assert_eq!(lowered.code[3].jadr, 5);
        assert_eq!(lowered.code[2].varsel, 1);
    }

    #[test]
    fn test_for_lowering() {
        // init; while(cond) { body; update } with continue at the
        // update, one back edge, break past the loop.
        let lowered = lower_str(
            "int s0 = 0; bool run;\n\
             int main() {\n\
                 for (int phase = 0; run; phase = 1) { s0 = 1; }\n\
             }"
        );
        // init@0, branch@1, false-jump@2, body@3, update@4, back@5
        assert_eq!(lowered.code.len(), 6);
        assert!(lowered.code[0].is(Flag::StateCapture));
        assert_eq!(lowered.code[0].state_mask, 0b10);
        assert_eq!(lowered.frames.len(), 1);
        assert_eq!(lowered.frames[0].kind, FrameKind::For);
        assert_eq!(lowered.frames[0].continue_target, Some(4));
        assert_eq!(lowered.frames[0].break_target, Some(6));
        assert_eq!(back_edges(&lowered), vec![5]);
        assert_eq!(lowered.code[5].jadr, 1);
    }

    #[test]
    fn test_continue_targets_loop_not_switch() {
        let lowered = lower_str(
            "int s0 = 0; bool go;\n\
             int main() { while (1) { if (go) continue; s0 = 1; } }"
        );
        let cont: Vec<&PendingJump> = lowered.pending.iter()
            .filter(|p| match p.kind {
                JumpKind::Continue(_) => true,
                _ => false,
            })
            .collect();
        assert_eq!(cont.len(), 1);
        match cont[0].kind {
            JumpKind::Continue(fid) => {
                assert_eq!(lowered.frames[fid].kind, FrameKind::While);
                assert_eq!(lowered.frames[fid].continue_target, Some(0));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_switch_banks_and_default() {
        let lowered = lower_str(
            "int state0 = 0; int state1 = 0; int state2 = 0; int case_in;\n\
             int main() {\n\
                 switch (case_in) {\n\
                 case 0: state1 = 0; state2 = 0; break;\n\
                 case 1: state1 = 0; state2 = 1; break;\n\
                 case 2: state1 = 1; state2 = 0; break;\n\
                 case 3: state1 = 1; state2 = 1; break;\n\
                 default: state1 = 0; state2 = 0; state0 = 0;\n\
                 }\n\
             }"
        );
        // dispatch@0, then per case: one capture and one break jump;
        // the default body merges to a single capture.
        assert_eq!(lowered.code.len(), 10);
        assert_eq!(lowered.switches.bank_count(), 1);
        assert_eq!(lowered.switches.get(0, 0), 1);
        assert_eq!(lowered.switches.get(0, 1), 3);
        assert_eq!(lowered.switches.get(0, 2), 5);
        assert_eq!(lowered.switches.get(0, 3), 7);
        // Unclaimed entries all point at the default body.
        assert_eq!(lowered.switches.get(0, 4), 9);
        assert_eq!(lowered.switches.get(0, 255), 9);
        // Dispatch + four breaks resolve against the switch frame.
        let breaks = lowered.pending.iter()
            .filter(|p| p.kind == JumpKind::Break(0))
            .count();
        assert_eq!(breaks, 5);
        assert_eq!(lowered.frames[0].break_target, Some(10));
        let d = &lowered.code[0];
        assert!(d.is(Flag::ForcedJmp));
        assert!(d.is(Flag::VarOrTimer));
        assert_eq!(d.switch_adr, 0);
    }

    #[test]
    fn test_switch_without_default_falls_past() {
        let lowered = lower_str(
            "int s0 = 0; int sel;\n\
             int main() { switch (sel) { case 1: s0 = 1; break; } }"
        );
        // dispatch@0, body@1, break@2; everything else past the
        // switch.
        assert_eq!(lowered.switches.get(0, 1), 1);
        assert_eq!(lowered.switches.get(0, 0), 3);
        assert_eq!(lowered.switches.get(0, 200), 3);
    }

    #[test]
    fn test_switch_fall_through() {
        let lowered = lower_str(
            "int s0 = 0; int s1 = 0; int sel;\n\
             int main() {\n\
                 switch (sel) { case 0: s0 = 1; case 1: s1 = 1; }\n\
             }"
        );
        // No break after case 0: its body flows straight into case
        // 1's capture. dispatch@0, case0@1, case1@2.
        assert_eq!(lowered.code.len(), 3);
        assert_eq!(lowered.switches.get(0, 0), 1);
        assert_eq!(lowered.switches.get(0, 1), 2);
    }

    #[test]
    fn test_duplicate_case_value() {
        let err = try_lower(
            "int s0 = 0; int sel;\n\
             int main() { switch (sel) { case 1: break; case 1: break; } }"
        ).unwrap_err();
        match err {
            Error::UnsupportedConstruct { what, .. } =>
                assert!(what.contains("duplicate case")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_relation_compiles_to_dispatch() {
        let lowered = lower_str(
            "int s0 = 0; int sensor;\n\
             int main() { if (sensor < 2) s0 = 1; }"
        );
        // dispatch@0, true stub@1, false stub@2, body@3.
        assert_eq!(lowered.code.len(), 4);
        assert!(lowered.code[0].is(Flag::VarOrTimer));
        assert_eq!(lowered.code[1].jadr, 3);
        assert_eq!(lowered.code[2].jadr, 4);
        assert_eq!(lowered.switches.get(0, 0), 1);
        assert_eq!(lowered.switches.get(0, 1), 1);
        assert_eq!(lowered.switches.get(0, 2), 2);
        assert_eq!(lowered.switches.get(0, 255), 2);
    }

    #[test]
    fn test_return_defers_exit() {
        let lowered = lower_str("int s0 = 0; int main() { return 0; }");
        assert_eq!(
            lowered.pending,
            vec![PendingJump { index: 0, kind: JumpKind::Exit }]
        );
    }

    #[test]
    fn test_nonconstant_rhs_is_rejected() {
        let err = try_lower(
            "int a = 0; int b = 0; int main() { a = a + b; }"
        ).unwrap_err();
        match err {
            Error::UnsupportedConstruct { what, .. } =>
                assert!(what.contains("not constant")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_assignment_to_input_is_rejected() {
        let err = try_lower("bool a; int main() { a = 1; }").unwrap_err();
        match err {
            Error::UnsupportedConstruct { what, .. } =>
                assert!(what.contains("input")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_condition_on_state_is_rejected() {
        let err = try_lower(
            "int s0 = 0; int main() { if (s0) s0 = 1; }"
        ).unwrap_err();
        match err {
            Error::UnsupportedCondition { what, .. } =>
                assert!(what.contains("state output")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_break_outside_loop_is_rejected() {
        let err = try_lower("int main() { break; }").unwrap_err();
        match err {
            Error::UnsupportedConstruct { what, .. } =>
                assert!(what.contains("break")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_main_is_rejected() {
        let err = try_lower("int x = 0;").unwrap_err();
        match err {
            Error::UnsupportedConstruct { what, .. } =>
                assert!(what.contains("main")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
