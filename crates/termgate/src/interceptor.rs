//! Command stream interception.
//!
//! The interceptor sits between client input and the PTY. Incoming
//! bytes accumulate in a per-session line buffer; when a terminator
//! arrives, the assembled line is handed up for a verdict with the
//! terminator withheld. The unblock gesture is recognized ahead of line
//! assembly so it works even while all other input is being discarded.
//!
//! This type is a pure state machine over bytes — it performs no I/O
//! and makes no analysis decision itself, which keeps it directly
//! testable.

use termgate_types::UNBLOCK_GESTURE;

/// Longest line the interceptor will assemble. Anything this long is
/// not an interactive command (a paste or binary stream); its bytes
/// flow through unanalyzed until the next terminator, so the buffer
/// never grows past this bound.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// What the session loop should do with a piece of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Flush these bytes to the PTY unchanged (blank lines, and
    /// oversized-line passthrough).
    Forward(Vec<u8>),
    /// A logical command line is complete. `line` holds the raw bytes
    /// including the terminator, withheld pending the verdict;
    /// `command` is the reconstructed text without the terminator.
    Analyze { command: String, line: Vec<u8> },
    /// The unblock gesture was seen.
    Gesture,
}

/// Per-session line assembly state.
#[derive(Debug, Default)]
pub struct CommandInterceptor {
    buffer: Vec<u8>,
    blocked: bool,
    /// The current line exceeded [`MAX_LINE_BYTES`]; its remaining
    /// bytes pass through until a terminator arrives.
    overflowed: bool,
}

impl CommandInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror of the session's block state. Entering the blocked state
    /// clears the assembly buffer so a partial command typed before the
    /// block can never leak through after an unblock.
    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
        if blocked {
            self.buffer.clear();
            self.overflowed = false;
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Consume one input chunk and emit the resulting actions in order.
    ///
    /// While blocked, everything except the gesture is discarded.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<InputAction> {
        let mut actions = Vec::new();
        let mut passthrough: Vec<u8> = Vec::new();

        for &byte in bytes {
            if byte == UNBLOCK_GESTURE {
                if !passthrough.is_empty() {
                    actions.push(InputAction::Forward(std::mem::take(&mut passthrough)));
                }
                actions.push(InputAction::Gesture);
                continue;
            }
            if self.blocked {
                continue;
            }

            if self.overflowed {
                passthrough.push(byte);
                if byte == b'\n' || byte == b'\r' {
                    self.overflowed = false;
                    actions.push(InputAction::Forward(std::mem::take(&mut passthrough)));
                }
                continue;
            }

            self.buffer.push(byte);
            if byte == b'\n' || byte == b'\r' {
                let line = std::mem::take(&mut self.buffer);
                let command = reconstruct_command(&line[..line.len() - 1]);
                if command.trim().is_empty() {
                    // Blank lines never reach the analyzer.
                    actions.push(InputAction::Forward(line));
                } else {
                    actions.push(InputAction::Analyze { command, line });
                }
            } else if self.buffer.len() >= MAX_LINE_BYTES {
                passthrough.extend(std::mem::take(&mut self.buffer));
                self.overflowed = true;
            }
        }

        if !passthrough.is_empty() {
            actions.push(InputAction::Forward(passthrough));
        }
        actions
    }
}

/// Rebuild the logical command text from raw line bytes: apply
/// backspace/delete edits, then decode lossily. The raw bytes
/// themselves are forwarded verbatim on a pass decision; this
/// reconstruction exists only for classification.
fn reconstruct_command(bytes: &[u8]) -> String {
    let mut edited: Vec<u8> = Vec::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            0x08 | 0x7f => {
                edited.pop();
            }
            _ => edited.push(b),
        }
    }
    String::from_utf8_lossy(&edited).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_of(actions: &[InputAction]) -> Vec<(String, Vec<u8>)> {
        actions
            .iter()
            .filter_map(|a| match a {
                InputAction::Analyze { command, line } => Some((command.clone(), line.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_line_assembly_across_chunks() {
        let mut i = CommandInterceptor::new();
        assert!(i.feed(b"ec").is_empty());
        assert!(i.feed(b"ho h").is_empty());
        let actions = i.feed(b"i\n");
        let lines = analyze_of(&actions);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, "echo hi");
        assert_eq!(lines[0].1, b"echo hi\n".to_vec());
    }

    #[test]
    fn test_carriage_return_terminates() {
        let mut i = CommandInterceptor::new();
        let actions = i.feed(b"ls\r");
        assert_eq!(analyze_of(&actions)[0].0, "ls");
    }

    #[test]
    fn test_withheld_line_is_byte_identical() {
        let mut i = CommandInterceptor::new();
        let input = b"echo \"hi\"\n";
        let actions = i.feed(input);
        assert_eq!(analyze_of(&actions)[0].1, input.to_vec());
    }

    #[test]
    fn test_blank_line_forwards_without_analysis() {
        let mut i = CommandInterceptor::new();
        assert_eq!(i.feed(b"\n"), vec![InputAction::Forward(b"\n".to_vec())]);
        assert_eq!(
            i.feed(b"   \r"),
            vec![InputAction::Forward(b"   \r".to_vec())]
        );
    }

    #[test]
    fn test_backspace_edits_reconstruction_but_not_raw_bytes() {
        let mut i = CommandInterceptor::new();
        let input = b"lss\x7fs\n";
        let actions = i.feed(input);
        let (command, line) = &analyze_of(&actions)[0];
        assert_eq!(command, "lss");
        assert_eq!(line, &input.to_vec());

        let mut i = CommandInterceptor::new();
        let actions = i.feed(b"rm -rf /x\x7f\n");
        assert_eq!(analyze_of(&actions)[0].0, "rm -rf /");
    }

    #[test]
    fn test_blocked_discards_everything_but_gesture() {
        let mut i = CommandInterceptor::new();
        i.set_blocked(true);
        assert!(i.feed(b"rm -rf /\n").is_empty());
        assert_eq!(i.feed(&[UNBLOCK_GESTURE]), vec![InputAction::Gesture]);
    }

    #[test]
    fn test_gesture_recognized_mid_line_while_armed() {
        let mut i = CommandInterceptor::new();
        let actions = i.feed(&[b'l', UNBLOCK_GESTURE, b's', b'\n']);
        assert_eq!(actions[0], InputAction::Gesture);
        assert_eq!(analyze_of(&actions)[0].0, "ls");
    }

    #[test]
    fn test_block_transition_clears_partial_buffer() {
        let mut i = CommandInterceptor::new();
        i.feed(b"rm -r");
        i.set_blocked(true);
        i.set_blocked(false);
        // The partial "rm -r" must not resurface in the next line.
        let actions = i.feed(b"ls\n");
        assert_eq!(analyze_of(&actions)[0].0, "ls");
    }

    #[test]
    fn test_oversized_line_passes_through_bounded() {
        let mut i = CommandInterceptor::new();
        let big = vec![b'a'; MAX_LINE_BYTES + 100];
        let actions = i.feed(&big);

        // Everything flushed through unanalyzed, nothing retained
        // beyond the cap.
        assert!(analyze_of(&actions).is_empty());
        let forwarded: usize = actions
            .iter()
            .map(|a| match a {
                InputAction::Forward(bytes) => bytes.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(forwarded, big.len());
        assert!(i.buffer.len() < MAX_LINE_BYTES);
    }

    #[test]
    fn test_overflow_ends_at_terminator_and_preserves_order() {
        let mut i = CommandInterceptor::new();
        let mut input = vec![b'a'; MAX_LINE_BYTES];
        input.extend_from_slice(b"tail\nls\n");
        let actions = i.feed(&input);

        // The oversized line (tail and terminator included) is
        // forwarded before the next line's verdict is requested.
        match &actions[0] {
            InputAction::Forward(bytes) => {
                assert_eq!(bytes.len(), MAX_LINE_BYTES + b"tail\n".len());
                assert!(bytes.ends_with(b"tail\n"));
            }
            other => panic!("expected forward first, got {other:?}"),
        }
        let lines = analyze_of(&actions);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, "ls");
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut i = CommandInterceptor::new();
        let actions = i.feed(b"ls\npwd\n");
        let lines = analyze_of(&actions);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, "ls");
        assert_eq!(lines[1].0, "pwd");
    }
}
