//! Control flow directed exploration of an image.
//!
//! The [`Explorer`] owns a FIFO of [`AddressedRoot`]s and an ordered map of every offset it has
//! decoded. Each dequeued root is walked forward one instruction at a time until the walk runs
//! into an offset that was already decoded, an unconditional transfer, or the end of the image.
//! Relative branch destinations are queued as new roots, so the whole reachable graph is covered
//! without recursion and every offset is decoded at most once.
//!
//! Two heuristics keep the walk on track in mixed real/protected mode code:
//!
//! - `MOV CR0, reg` flips the protected-mode assumption for the rest of the walk
//! - while protected mode is assumed, an `INT` with the [`ServiceCall`] vector skips the inline
//!   service identifier that follows it
//!
//! # Example
//!
//! ```rust
//! use lescope::{
//!     disassembler::{AnalysisOptions, CodeMode, Explorer},
//!     ByteSource,
//! };
//!
//! // jz +1; nop; ret
//! let source = ByteSource::new(vec![0x74, 0x01, 0x90, 0xC3], 0);
//! let mut explorer = Explorer::new(&source, &AnalysisOptions::default());
//! explorer.add_root(0, CodeMode::real16(), Some("start"));
//! explorer.analyze()?;
//!
//! assert_eq!(explorer.visited().len(), 3);
//! assert!(explorer.visited()[&3].is_branch_target);
//! # Ok::<(), lescope::Error>(())
//! ```

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    sync::Arc,
};

use crate::{
    disassembler::{
        address::{SegmentMap, SegmentedAddress},
        decoder::{DecodedInstruction, InstructionDecoder, Mnemonic, Operand},
        mode::{AddressedRoot, CodeMode, VisitRecord},
        servicecall::ServiceCall,
        AnalysisOptions,
    },
    file::source::ByteSource,
    Error, Result,
};

/// A far branch the explorer recognized but could not follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Flat offset of the instruction
    pub offset: u32,
    /// Display address of the instruction
    pub address: SegmentedAddress,
    /// Formatted instruction
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: (offset {:X}) Not handled due to protected mode being enabled. {}",
            self.address, self.offset, self.text
        )
    }
}

/// Counters of one explorer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExplorerStats {
    /// Instructions decoded
    pub decoded: u64,
    /// Roots put on the queue, including the initial ones
    pub roots_queued: u64,
    /// Diagnostics raised
    pub diagnostics: u64,
}

/// Synthesized label of an unnamed branch target
#[must_use]
pub fn label_name(offset: u32) -> String {
    format!("lab_{offset:06X}")
}

/// Work queue driven disassembly explorer over one [`ByteSource`]
pub struct Explorer<'a> {
    source: &'a ByteSource,
    decoder: InstructionDecoder,
    service_call: Option<Arc<dyn ServiceCall>>,
    segments: SegmentMap,
    queue: VecDeque<AddressedRoot>,
    visited: BTreeMap<u32, VisitRecord>,
    labels: BTreeMap<u32, String>,
    diagnostics: Vec<Diagnostic>,
    stats: ExplorerStats,
}

impl<'a> Explorer<'a> {
    /// Create an explorer with an empty queue
    ///
    /// ## Arguments
    /// * 'source'  - The (relocated) image to explore
    /// * 'options' - CPU model and service call convention
    #[must_use]
    pub fn new(source: &'a ByteSource, options: &AnalysisOptions) -> Explorer<'a> {
        Explorer {
            source,
            decoder: InstructionDecoder::new(options.cpu),
            service_call: options.service_call.clone(),
            segments: SegmentMap::new(),
            queue: VecDeque::new(),
            visited: BTreeMap::new(),
            labels: BTreeMap::new(),
            diagnostics: Vec::new(),
            stats: ExplorerStats::default(),
        }
    }

    /// Queue a starting point. A given `label` replaces any existing label at `offset`.
    pub fn add_root(&mut self, offset: u32, mode: CodeMode, label: Option<&str>) {
        if let Some(label) = label {
            self.add_label(offset, label);
        }
        self.queue_root(offset, mode);
    }

    /// Name `offset` without exploring it, replacing any existing label
    pub fn add_label(&mut self, offset: u32, name: impl Into<String>) {
        self.labels.insert(offset, name.into());
    }

    /// Register a segment start for display addresses
    pub fn add_segment_start(&mut self, start: u32) {
        self.segments.add_start(start);
    }

    /// Drain the root queue.
    ///
    /// Calling this again without adding roots does nothing.
    ///
    /// # Errors
    /// Fails if a walk runs outside the image, hits an undecodable or unsupported instruction,
    /// or meets a far branch shape without a traversal rule. The explorer keeps everything it
    /// recorded up to that point.
    pub fn analyze(&mut self) -> Result<()> {
        let mut walks = 0_u64;
        while let Some(root) = self.queue.pop_front() {
            self.walk(root)?;
            walks += 1;
        }

        if walks > 0 {
            log::info!(
                "explored {} instructions in {} walks, {} diagnostics",
                self.stats.decoded,
                walks,
                self.stats.diagnostics
            );
        }

        Ok(())
    }

    fn walk(&mut self, root: AddressedRoot) -> Result<()> {
        let end = self.source.end();
        let mut mode = root.mode;
        let mut offset = root.offset;
        let mut is_root = true;

        if u64::from(offset) >= end {
            log::debug!("root {offset:08X} lies beyond the image, not followed");
            return Ok(());
        }

        while u64::from(offset) < end {
            if let Some(record) = self.visited.get_mut(&offset) {
                if is_root {
                    record.is_branch_target = true;
                }
                break;
            }

            let instr = self.decoder.decode_at(self.source, offset, mode.width)?;
            self.stats.decoded += 1;
            self.visited.insert(
                offset,
                VisitRecord {
                    mode,
                    is_branch_target: is_root,
                },
            );
            is_root = false;

            let mut next = instr.next_offset();
            match instr.mnemonic {
                Mnemonic::Mov => {
                    if instr.writes_cr0() {
                        mode = mode.toggled();
                        log::debug!("{offset:08X}: CR0 written, now assuming {mode}");
                    }
                }
                Mnemonic::Int => {
                    if let Some(trailing) = self.service_call_trailing(&instr, mode) {
                        self.source.bytes(u64::from(next), trailing as usize)?;
                        next = next.wrapping_add(trailing);
                    }
                }
                Mnemonic::Jmp => {
                    if let Some(target) = instr.relative_target() {
                        self.queue_root(target, mode);
                    }
                    break;
                }
                Mnemonic::Call => {
                    if let Some(target) = instr.relative_target() {
                        self.queue_root(target, mode);
                    }
                }
                Mnemonic::Jcc | Mnemonic::Loop => {
                    let Some(target) = instr.relative_target() else {
                        return Err(Error::Error(format!(
                            "{} {} -- conditional branch without relative target",
                            self.address(offset, mode),
                            instr.text()
                        )));
                    };
                    self.queue_root(target, mode);
                }
                Mnemonic::Ret | Mnemonic::Retf | Mnemonic::Iret => break,
                Mnemonic::JmpFar => {
                    self.far_branch(&instr, mode)?;
                    break;
                }
                Mnemonic::CallFar => self.far_branch(&instr, mode)?,
                Mnemonic::Other => {}
            }

            offset = next;
        }

        Ok(())
    }

    fn far_branch(&mut self, instr: &DecodedInstruction, mode: CodeMode) -> Result<()> {
        match instr.first_operand() {
            // Not statically resolvable
            Some(Operand::Register(_) | Operand::Memory) => {}
            Some(Operand::Far16 { selector, offset }) => {
                if mode.assumed_protected {
                    self.diagnose(instr, mode);
                } else {
                    let target = u32::from(*selector) * 16 + u32::from(*offset);
                    self.queue_root(target, mode);
                }
            }
            Some(Operand::Far32 { .. }) if mode.assumed_protected => self.diagnose(instr, mode),
            _ => {
                return Err(Error::UnsupportedFarTarget {
                    address: self.address(instr.offset, mode).to_string(),
                    text: instr.text(),
                })
            }
        }

        Ok(())
    }

    fn diagnose(&mut self, instr: &DecodedInstruction, mode: CodeMode) {
        let diagnostic = Diagnostic {
            offset: instr.offset,
            address: self.address(instr.offset, mode),
            text: instr.text(),
        };

        log::warn!("{diagnostic}");
        self.stats.diagnostics += 1;
        self.diagnostics.push(diagnostic);
    }

    fn queue_root(&mut self, offset: u32, mode: CodeMode) {
        self.stats.roots_queued += 1;
        self.queue.push_back(AddressedRoot { offset, mode });
    }

    /// Number of trailing service call bytes after `instr`, if it is one in `mode`
    pub(crate) fn service_call_trailing(
        &self,
        instr: &DecodedInstruction,
        mode: CodeMode,
    ) -> Option<u32> {
        let service_call = self.service_call.as_ref()?;
        if mode.assumed_protected && instr.interrupt_vector() == Some(service_call.vector()) {
            Some(service_call.trailing_bytes())
        } else {
            None
        }
    }

    /// Display address of `offset` for code in `mode`
    #[must_use]
    pub fn address(&self, offset: u32, mode: CodeMode) -> SegmentedAddress {
        self.segments.address(offset, mode.width)
    }

    /// Label of `offset`: the explicit name, else a synthesized one for branch targets
    #[must_use]
    pub fn label_for(&self, offset: u32) -> Option<String> {
        if let Some(name) = self.labels.get(&offset) {
            return Some(name.clone());
        }

        match self.visited.get(&offset) {
            Some(record) if record.is_branch_target => Some(label_name(offset)),
            _ => None,
        }
    }

    /// Every decoded offset
    #[must_use]
    pub fn visited(&self) -> &BTreeMap<u32, VisitRecord> {
        &self.visited
    }

    /// Explicit labels
    #[must_use]
    pub fn labels(&self) -> &BTreeMap<u32, String> {
        &self.labels
    }

    /// Far branches that were recognized but not followed
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> ExplorerStats {
        self.stats
    }

    /// Roots still waiting to be walked
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// The explored image
    #[must_use]
    pub fn source(&self) -> &'a ByteSource {
        self.source
    }

    /// The decoder used for every walk
    #[must_use]
    pub fn decoder(&self) -> &InstructionDecoder {
        &self.decoder
    }

    /// The active service call convention
    #[must_use]
    pub fn service_call(&self) -> Option<&dyn ServiceCall> {
        self.service_call.as_deref()
    }

    /// Registered segment starts
    #[must_use]
    pub fn segments(&self) -> &SegmentMap {
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::{mode::OperandWidth, servicecall::VxdServiceCall};

    fn explore(code: &[u8], base: u32, roots: &[(u32, CodeMode)]) -> Result<Explorer<'static>> {
        let source: &'static ByteSource = Box::leak(Box::new(ByteSource::new(code.to_vec(), base)));
        let mut explorer = Explorer::new(source, &AnalysisOptions::default());
        for (offset, mode) in roots {
            explorer.add_root(*offset, *mode, None);
        }
        explorer.analyze()?;
        Ok(explorer)
    }

    #[test]
    fn self_loop_short_jump() {
        // jmp short +0
        let explorer = explore(&[0xEB, 0x00], 0, &[(0, CodeMode::real16())]).unwrap();

        assert_eq!(explorer.visited().len(), 1);
        assert!(explorer.visited()[&0].is_branch_target);
        assert_eq!(explorer.stats().decoded, 1);
        assert_eq!(explorer.pending(), 0);
    }

    #[test]
    fn single_return() {
        let explorer = explore(&[0xC3], 0, &[(0, CodeMode::real16())]).unwrap();

        assert_eq!(explorer.visited().len(), 1);
        assert_eq!(explorer.stats().roots_queued, 1);
        assert_eq!(explorer.pending(), 0);
    }

    #[test]
    fn cr0_write_flips_queued_mode() {
        #[rustfmt::skip]
        let code = [
            0x0F, 0x22, 0xC0, // mov cr0, eax
            0xEB, 0x01,       // jmp short +1
            0x90,             // nop, skipped
            0xC3,             // ret
        ];
        let explorer = explore(&code, 0, &[(0, CodeMode::real16())]).unwrap();

        let visited = explorer.visited();
        assert_eq!(visited.keys().copied().collect::<Vec<_>>(), vec![0, 3, 6]);
        assert!(!visited[&0].mode.assumed_protected);
        assert!(visited[&3].mode.assumed_protected);
        assert_eq!(visited[&6].mode, CodeMode::new(OperandWidth::Bits16, true));
        assert!(visited[&6].is_branch_target);
        assert!(!visited[&3].is_branch_target);
    }

    #[test]
    fn analyze_is_idempotent() {
        let code = [0x74, 0x01, 0x90, 0xC3];
        let mut explorer = explore(&code, 0, &[(0, CodeMode::real16())]).unwrap();
        let visited = explorer.visited().clone();
        let stats = explorer.stats();

        explorer.analyze().unwrap();
        assert_eq!(explorer.visited(), &visited);
        assert_eq!(explorer.stats(), stats);
    }

    #[test]
    fn aliasing_roots_decode_once() {
        let code = [0x90, 0x90, 0x90, 0xC3];
        let mode = CodeMode::real16();
        let roots = [(0, mode), (1, mode), (2, mode), (3, mode), (0, mode), (1, mode)];
        let explorer = explore(&code, 0, &roots).unwrap();

        assert_eq!(explorer.stats().decoded, 4);
        assert_eq!(explorer.visited().len(), 4);
        assert!(explorer.visited().values().all(|r| r.is_branch_target));
    }

    #[test]
    fn branch_target_flag_is_sticky() {
        // jz +1 reaches 3 as a branch target after 2 fell through into it
        let code = [0x74, 0x01, 0x90, 0xC3];
        let mut explorer = explore(&code, 0, &[(0, CodeMode::real16())]).unwrap();
        assert!(explorer.visited()[&3].is_branch_target);
        assert!(!explorer.visited()[&2].is_branch_target);

        explorer.add_root(2, CodeMode::real16(), None);
        explorer.analyze().unwrap();
        assert!(explorer.visited()[&2].is_branch_target);
        assert!(explorer.visited()[&3].is_branch_target);
    }

    #[test]
    fn calls_continue_jumps_stop() {
        #[rustfmt::skip]
        let code = [
            0xE8, 0x03, 0x00, // call +3
            0xEB, 0xFE,       // jmp $
            0x90,             // nop, unreached
            0xC3,             // ret
        ];
        let explorer = explore(&code, 0x100, &[(0x100, CodeMode::real16())]).unwrap();

        assert_eq!(
            explorer.visited().keys().copied().collect::<Vec<_>>(),
            vec![0x100, 0x103, 0x106]
        );
        assert!(explorer.visited()[&0x103].is_branch_target);
        assert_eq!(explorer.label_for(0x106).as_deref(), Some("lab_000106"));
        assert_eq!(explorer.label_for(0x105), None);
    }

    #[test]
    fn vxd_call_skips_service_id() {
        #[rustfmt::skip]
        let code = [
            0xCD, 0x20,             // int 20h
            0x01, 0x00, 0x01, 0x00, // Get_Cur_VM_Handle, VMM
            0xC3,                   // ret
        ];

        let explorer = explore(&code, 0x1000, &[(0x1000, CodeMode::protected32())]).unwrap();
        assert_eq!(
            explorer.visited().keys().copied().collect::<Vec<_>>(),
            vec![0x1000, 0x1006]
        );

        // in real mode the identifier decodes as add [eax], eax twice
        let real = CodeMode::new(OperandWidth::Bits32, false);
        let explorer = explore(&code, 0x1000, &[(0x1000, real)]).unwrap();
        assert_eq!(explorer.visited().len(), 4);
    }

    #[test]
    fn service_calls_can_be_disabled() {
        let code = [0xCD, 0x20, 0x01, 0x00, 0x01, 0x00, 0xC3];
        let source = ByteSource::new(code.to_vec(), 0);
        let options = AnalysisOptions {
            service_call: None,
            ..AnalysisOptions::default()
        };

        let mut explorer = Explorer::new(&source, &options);
        explorer.add_root(0, CodeMode::protected32(), None);
        explorer.analyze().unwrap();
        assert_eq!(explorer.visited().len(), 4);
        assert!(explorer.service_call().is_none());

        let other = AnalysisOptions {
            service_call: Some(Arc::new(VxdServiceCall::default())),
            ..AnalysisOptions::default()
        };
        let mut explorer = Explorer::new(&source, &other);
        explorer.add_root(0, CodeMode::protected32(), None);
        explorer.analyze().unwrap();
        assert_eq!(explorer.visited().len(), 2);
    }

    #[test]
    fn real_mode_far_jump_is_followed() {
        let mut code = vec![0x90; 0x1020];
        // jmp 0x0100:0x0010
        code[..5].copy_from_slice(&[0xEA, 0x10, 0x00, 0x00, 0x01]);
        code[0x1010] = 0xC3;

        let explorer = explore(&code, 0, &[(0, CodeMode::real16())]).unwrap();
        assert_eq!(
            explorer.visited().keys().copied().collect::<Vec<_>>(),
            vec![0, 0x1010]
        );
        assert!(explorer.visited()[&0x1010].is_branch_target);
        assert!(explorer.diagnostics().is_empty());
    }

    #[test]
    fn protected_far_targets_are_diagnosed() {
        #[rustfmt::skip]
        let code = [
            0x9A, 0x00, 0x10, 0x00, 0x00, 0x28, 0x00, // call 0x28:0x1000
            0xEA, 0x00, 0x20, 0x00, 0x00, 0x30, 0x00, // jmp 0x30:0x2000
            0xC3,                                     // ret, second root
        ];

        let roots = [(0, CodeMode::protected32()), (14, CodeMode::protected32())];
        let explorer = explore(&code, 0, &roots).unwrap();

        assert_eq!(explorer.diagnostics().len(), 2);
        assert_eq!(explorer.stats().diagnostics, 2);
        assert_eq!(explorer.diagnostics()[0].offset, 0);
        assert_eq!(explorer.diagnostics()[1].offset, 7);
        assert!(explorer.diagnostics()[0]
            .to_string()
            .starts_with("0000:00000000: (offset 0) Not handled due to protected mode"));
        assert_eq!(
            explorer.visited().keys().copied().collect::<Vec<_>>(),
            vec![0, 7, 14]
        );
    }

    #[test]
    fn protected_16_16_far_jump_is_diagnosed() {
        let code = [0xEA, 0x10, 0x00, 0x00, 0x01];
        let protected16 = CodeMode::new(OperandWidth::Bits16, true);
        let explorer = explore(&code, 0, &[(0, protected16)]).unwrap();

        assert_eq!(explorer.visited().len(), 1);
        assert_eq!(explorer.diagnostics().len(), 1);
    }

    #[test]
    fn real_mode_16_32_far_jump_is_fatal() {
        // 66 EA: jmp ptr16:32 in 16-bit code
        let code = [0x66, 0xEA, 0x00, 0x10, 0x00, 0x00, 0x28, 0x00];
        match explore(&code, 0, &[(0, CodeMode::real16())]) {
            Err(Error::UnsupportedFarTarget { address, .. }) => assert_eq!(address, "0000:0000"),
            Err(other) => panic!("Expected unsupported far target, got {other:?}"),
            Ok(_) => panic!("Expected unsupported far target"),
        }
    }

    #[test]
    fn indirect_far_jump_is_not_followed() {
        // jmp far [bx]
        let explorer = explore(&[0xFF, 0x2F, 0xC3], 0, &[(0, CodeMode::real16())]).unwrap();
        assert_eq!(explorer.visited().len(), 1);
        assert!(explorer.diagnostics().is_empty());
    }

    #[test]
    fn walk_past_end_is_fatal() {
        // jz +0x10, then fall through into a truncated mov
        let code = [0x74, 0x10, 0xB8, 0x00];
        match explore(&code, 0, &[(0, CodeMode::real16())]) {
            Err(Error::AddressOutOfRange { offset }) => assert_eq!(offset, 4),
            Err(other) => panic!("Expected out of range, got {other:?}"),
            Ok(_) => panic!("Expected out of range"),
        }
    }

    #[test]
    fn truncated_service_call_is_fatal() {
        // int 20h with only half of its service id
        let code = [0xCD, 0x20, 0x01, 0x00];
        match explore(&code, 0x1000, &[(0x1000, CodeMode::protected32())]) {
            Err(Error::AddressOutOfRange { offset }) => assert_eq!(offset, 0x1004),
            Err(other) => panic!("Expected out of range, got {other:?}"),
            Ok(_) => panic!("Expected out of range"),
        }

        // the same bytes are a plain interrupt and an add in real mode
        let explorer = explore(&code, 0x1000, &[(0x1000, CodeMode::real16())]).unwrap();
        assert_eq!(explorer.visited().len(), 2);
    }

    #[test]
    fn roots_outside_the_image() {
        let explorer = explore(&[0xC3], 0x100, &[(0x200, CodeMode::real16())]).unwrap();
        assert!(explorer.visited().is_empty());

        assert!(matches!(
            explore(&[0xC3], 0x100, &[(0x10, CodeMode::real16())]),
            Err(Error::AddressOutOfRange { .. })
        ));
    }

    #[test]
    fn labels_overwrite() {
        let source = ByteSource::new(vec![0xC3], 0);
        let mut explorer = Explorer::new(&source, &AnalysisOptions::default());

        explorer.add_label(0, "first");
        explorer.add_root(0, CodeMode::real16(), Some("Entry"));
        assert_eq!(explorer.label_for(0).as_deref(), Some("Entry"));

        explorer.add_label(0, "renamed");
        explorer.analyze().unwrap();
        assert_eq!(explorer.label_for(0).as_deref(), Some("renamed"));
        assert_eq!(explorer.labels().len(), 1);
    }
}
