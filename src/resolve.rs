// Jump resolution: the third pipeline stage.
//
// Every pending jump is patched in place from its symbolic target:
// break and continue read the owning frame's finalized addresses,
// exit reads the post-program address, direct jumps carry their own.
// Afterwards the program must be fully addressable; anything else is
// a bug in the lowerer, not in the user's source.

use crate::error::{Error, Result};
use crate::layout::Field;
use crate::microcode::{JumpKind, Lowered, UNRESOLVED};


pub fn resolve(lowered: &mut Lowered) -> Result<()> {
    let end = lowered.code.len() as u32;

    let pending = std::mem::replace(&mut lowered.pending, Vec::new());
    for jump in pending {
        let target = match jump.kind {
            JumpKind::Direct(addr) => addr as u32,
            JumpKind::Exit => end,
            JumpKind::Break(frame) => lowered.frames
                .get(frame)
                .and_then(|f| f.break_target)
                .ok_or(Error::UnresolvedJump { index: jump.index })?,
            JumpKind::Continue(frame) => lowered.frames
                .get(frame)
                .and_then(|f| f.continue_target)
                .ok_or(Error::UnresolvedJump { index: jump.index })?,
        };
        lowered.code[jump.index].jadr = target;
        lowered.maxima.observe(Field::Jadr, target);
    }

    // Every jump target must now land inside the program or one
    // past its end.
    for (index, instruction) in lowered.code.iter().enumerate() {
        if instruction.jadr == UNRESOLVED || instruction.jadr > end {
            return Err(Error::UnresolvedJump { index });
        }
    }

    // Same for every switch-bank slot.
    if lowered.switches.words().any(|w| w > end) {
        return Err(Error::UnresolvedJump { index: end as usize });
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::microcode::{
        FieldMaxima, FrameKind, FrameRecord, Instruction, PendingJump,
        SwitchTable,
    };

    fn lowered_with(
        code: Vec<Instruction>,
        pending: Vec<PendingJump>,
        frames: Vec<FrameRecord>,
    ) -> Lowered {
        Lowered {
            code,
            pending,
            frames,
            switches: SwitchTable::new(8),
            maxima: FieldMaxima::default(),
        }
    }

    #[test]
    fn test_kinds_resolve() {
        let mut lowered = lowered_with(
            vec![
                Instruction::jump_unresolved(),
                Instruction::jump_unresolved(),
                Instruction::jump_unresolved(),
                Instruction::jump_unresolved(),
            ],
            vec![
                PendingJump { index: 0, kind: JumpKind::Break(0) },
                PendingJump { index: 1, kind: JumpKind::Continue(0) },
                PendingJump { index: 2, kind: JumpKind::Exit },
                PendingJump { index: 3, kind: JumpKind::Direct(1) },
            ],
            vec![FrameRecord {
                kind: FrameKind::While,
                continue_target: Some(0),
                break_target: Some(4),
            }],
        );
        resolve(&mut lowered).unwrap();
        assert!(lowered.pending.is_empty());
        assert_eq!(lowered.code[0].jadr, 4);
        assert_eq!(lowered.code[1].jadr, 0);
        assert_eq!(lowered.code[2].jadr, 4);
        assert_eq!(lowered.code[3].jadr, 1);
        assert_eq!(lowered.maxima.get(Field::Jadr), 4);
    }

    #[test]
    fn test_unfinalized_frame_is_an_error() {
        let mut lowered = lowered_with(
            vec![Instruction::jump_unresolved()],
            vec![PendingJump { index: 0, kind: JumpKind::Break(0) }],
            vec![FrameRecord {
                kind: FrameKind::While,
                continue_target: None,
                break_target: None,
            }],
        );
        match resolve(&mut lowered) {
            Err(Error::UnresolvedJump { index: 0 }) => (),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_surviving_sentinel_is_an_error() {
        let mut lowered = lowered_with(
            vec![Instruction::jump_unresolved()],
            vec![],
            vec![],
        );
        match resolve(&mut lowered) {
            Err(Error::UnresolvedJump { index: 0 }) => (),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
