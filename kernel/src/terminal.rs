//! The three virtual terminals: line editing state, private video backing
//! pages, and the active-terminal switch the keyboard collaborator drives.
//! Each terminal owns one independently scheduled foreground shell; the
//! switch path spawns it the first time the terminal is entered.

use crate::{
    arch::int,
    error::Result,
    mem::paging,
    proc::{context::Transfer, exec},
};
use common::layout::VIDEO_PAGE_SIZE;
use lazy_static::lazy_static;
use log::info;
use spin::Mutex;

pub const TERMINAL_COUNT: usize = 3;
pub const LINE_BUF_LEN: usize = 128;

const NUM_COLS: usize = 80;
const NUM_ROWS: usize = 25;
const ATTRIB: u8 = 0x07;

struct TerminalSession {
    cursor_x: usize,
    cursor_y: usize,
    line_buf: [u8; LINE_BUF_LEN],
    line_len: usize,
    /// Last completed line, parked here until a terminal read consumes it.
    read_buf: [u8; LINE_BUF_LEN],
    read_len: usize,
    line_ready: bool,
    /// Set the first time a shell is launched here; never reverts.
    shell_launched: bool,
    video: [u8; VIDEO_PAGE_SIZE],
}

impl TerminalSession {
    const fn new() -> Self {
        Self {
            cursor_x: 0,
            cursor_y: 0,
            line_buf: [0; LINE_BUF_LEN],
            line_len: 0,
            read_buf: [0; LINE_BUF_LEN],
            read_len: 0,
            line_ready: false,
            shell_launched: false,
            video: [0; VIDEO_PAGE_SIZE],
        }
    }

    fn clear_line(&mut self) {
        self.line_buf = [0; LINE_BUF_LEN];
        self.line_len = 0;
    }
}

struct TerminalManager {
    sessions: [TerminalSession; TERMINAL_COUNT],
    active: usize,
    /// The visible text page; the active terminal's alias resolves here.
    screen: [u8; VIDEO_PAGE_SIZE],
}

impl TerminalManager {
    const fn new() -> Self {
        Self {
            sessions: [
                TerminalSession::new(),
                TerminalSession::new(),
                TerminalSession::new(),
            ],
            active: 0,
            screen: [0; VIDEO_PAGE_SIZE],
        }
    }

    /// The page terminal `t` currently renders into: the visible page while
    /// it is active, its private backing page otherwise.
    fn page_mut(&mut self, terminal: usize) -> &mut [u8; VIDEO_PAGE_SIZE] {
        if terminal == self.active {
            &mut self.screen
        } else {
            &mut self.sessions[terminal].video
        }
    }

    fn put_byte(&mut self, terminal: usize, byte: u8) {
        let (x, y) = {
            let s = &self.sessions[terminal];
            (s.cursor_x, s.cursor_y)
        };

        match byte {
            b'\n' => {
                self.sessions[terminal].cursor_x = 0;
                self.sessions[terminal].cursor_y = y + 1;
            }
            _ => {
                let cell = (y * NUM_COLS + x) * 2;
                let page = self.page_mut(terminal);
                page[cell] = byte;
                page[cell + 1] = ATTRIB;

                self.sessions[terminal].cursor_x = x + 1;
                if self.sessions[terminal].cursor_x == NUM_COLS {
                    self.sessions[terminal].cursor_x = 0;
                    self.sessions[terminal].cursor_y = y + 1;
                }
            }
        }

        if self.sessions[terminal].cursor_y == NUM_ROWS {
            self.scroll(terminal);
        }
    }

    /// Moves every row up one line and blanks the bottom row.
    fn scroll(&mut self, terminal: usize) {
        let page = self.page_mut(terminal);
        page.copy_within(NUM_COLS * 2.., 0);

        let last_row = (NUM_ROWS - 1) * NUM_COLS * 2;
        for col in 0..NUM_COLS {
            page[last_row + col * 2] = b' ';
            page[last_row + col * 2 + 1] = ATTRIB;
        }

        self.sessions[terminal].cursor_y = NUM_ROWS - 1;
        self.sessions[terminal].cursor_x = 0;
    }

    fn clear(&mut self, terminal: usize) {
        self.page_mut(terminal).fill(0);
        self.sessions[terminal].cursor_x = 0;
        self.sessions[terminal].cursor_y = 0;
        self.sessions[terminal].clear_line();
    }
}

lazy_static! {
    static ref TERMINALS: Mutex<TerminalManager> = Mutex::new(TerminalManager::new());
}

pub fn init() {
    *TERMINALS.lock() = TerminalManager::new();
}

/// Index of the terminal that owns the keyboard and the visible page.
pub fn active() -> usize {
    TERMINALS.lock().active
}

pub fn shell_launched(terminal: usize) -> bool {
    TERMINALS.lock().sessions[terminal].shell_launched
}

/// Marks a terminal's shell as launched without going through a switch;
/// boot uses this for terminal 0.
pub fn mark_shell_launched(terminal: usize) {
    TERMINALS.lock().sessions[terminal].shell_launched = true;
}

/// Makes `terminal` the active one: swaps the visible page with the private
/// backing pages and rebinds the video alias. Entering a terminal that has
/// never run a shell launches one; the returned transfer then jumps into it.
pub fn switch_to(terminal: usize) -> Result<Transfer> {
    debug_assert!(terminal < TERMINAL_COUNT);

    let needs_shell = int::free(|| {
        let mut manager = TERMINALS.lock();
        if manager.active == terminal {
            return None;
        }

        paging::unbind_terminal_video();

        let outgoing = manager.active;
        let screen = manager.screen;
        manager.sessions[outgoing].video = screen;
        manager.screen = manager.sessions[terminal].video;

        paging::bind_terminal_video(terminal);
        manager.active = terminal;

        info!("terminal: Switched (from: {}, to: {})", outgoing, terminal);

        if !manager.sessions[terminal].shell_launched {
            manager.sessions[terminal].shell_launched = true;
            Some(())
        } else {
            None
        }
    });

    match needs_shell {
        Some(()) => exec::execute(exec::SHELL_COMMAND),
        None => Ok(Transfer::None),
    }
}

/// Keyboard collaborator: one edited character into the active terminal's
/// line buffer. Characters past the guard band at the end are dropped.
pub fn input_char(byte: u8) {
    let mut manager = TERMINALS.lock();
    let active = manager.active;
    let session = &mut manager.sessions[active];

    if session.line_len < LINE_BUF_LEN - 8 {
        session.line_buf[session.line_len] = byte;
        session.line_len += 1;
    }
}

/// Keyboard collaborator: erase the most recent unconsumed character.
pub fn backspace() {
    let mut manager = TERMINALS.lock();
    let active = manager.active;
    let session = &mut manager.sessions[active];

    if session.line_len > 0 {
        session.line_len -= 1;
        session.line_buf[session.line_len] = 0;
    }
}

/// Keyboard collaborator: the current line is complete. It moves to the
/// read buffer for the next terminal read and the edit buffer clears right
/// away.
pub fn complete_line() {
    let mut manager = TERMINALS.lock();
    let active = manager.active;
    let session = &mut manager.sessions[active];

    session.read_buf = session.line_buf;
    session.read_len = session.line_len;
    session.line_ready = true;
    session.clear_line();
}

/// Clears the active terminal's page, cursor and line state (ctrl-L).
pub fn clear_active() {
    int::free(|| {
        let mut manager = TERMINALS.lock();
        let active = manager.active;
        manager.clear(active);
    });
}

/// Terminal-capability read: blocks until `terminal` has a completed line,
/// then hands it over with a trailing newline. The wait busy-spins with
/// interrupts enabled so the timer and keyboard stay serviceable.
pub fn read_line(terminal: usize, buf: &mut [u8]) -> Result<usize> {
    debug_assert!(terminal < TERMINAL_COUNT);

    if buf.is_empty() {
        return Ok(0);
    }

    loop {
        int::enable();
        if TERMINALS.lock().sessions[terminal].line_ready {
            break;
        }
        core::hint::spin_loop();
    }

    int::free(|| {
        let mut manager = TERMINALS.lock();
        let session = &mut manager.sessions[terminal];

        let copied = session.read_len.min(buf.len().saturating_sub(1));
        buf[..copied].copy_from_slice(&session.read_buf[..copied]);
        buf[copied] = b'\n';

        session.line_ready = false;
        session.read_len = 0;

        Ok(copied + 1)
    })
}

/// Terminal-capability write: renders `buf` through `terminal`'s current
/// page.
pub fn write_bytes(terminal: usize, buf: &[u8]) -> Result<usize> {
    debug_assert!(terminal < TERMINAL_COUNT);

    int::free(|| {
        let mut manager = TERMINALS.lock();
        for byte in buf {
            manager.put_byte(terminal, *byte);
        }
    });

    Ok(buf.len())
}

/// Snapshot of the visible page, for the rendering collaborator and tests.
pub fn screen_snapshot() -> alloc::vec::Vec<u8> {
    TERMINALS.lock().screen.to_vec()
}

/// Snapshot of a terminal's private backing page.
pub fn backing_snapshot(terminal: usize) -> alloc::vec::Vec<u8> {
    TERMINALS.lock().sessions[terminal].video.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_editing_round_trip() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();

        for byte in b"hello" {
            input_char(*byte);
        }
        backspace();
        complete_line();

        let mut buf = [0u8; LINE_BUF_LEN];
        let n = read_line(0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hell\n");

        // consumed: the ready flag dropped with the line
        assert!(!TERMINALS.lock().sessions[0].line_ready);
    }

    #[test]
    fn long_lines_stop_at_guard_band() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();

        for _ in 0..LINE_BUF_LEN * 2 {
            input_char(b'x');
        }
        assert_eq!(TERMINALS.lock().sessions[0].line_len, LINE_BUF_LEN - 8);
    }

    #[test]
    fn write_renders_into_cells_and_scrolls() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();

        write_bytes(0, b"ok").unwrap();
        let screen = screen_snapshot();
        assert_eq!(screen[0], b'o');
        assert_eq!(screen[1], ATTRIB);
        assert_eq!(screen[2], b'k');

        // push the cursor past the bottom row
        for _ in 0..NUM_ROWS {
            write_bytes(0, b"line\n").unwrap();
        }
        let screen = screen_snapshot();
        assert_eq!(TERMINALS.lock().sessions[0].cursor_y, NUM_ROWS - 1);
        // the first write scrolled off the top
        assert_ne!(screen[0], b'o');
    }

    #[test]
    fn switch_swaps_video_pages_and_spawns_shell_once() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();
        crate::boot().unwrap();

        write_bytes(0, b"A").unwrap();
        let marked = screen_snapshot();

        // first entry launches terminal 1's shell
        let transfer = switch_to(1).unwrap();
        assert!(matches!(transfer, Transfer::EnterUser { .. }));
        assert!(shell_launched(1));
        assert_eq!(crate::mem::paging::visible_terminal(), Some(1));

        // terminal 0's text moved into its private backing page
        assert_eq!(backing_snapshot(0), marked);
        assert_ne!(screen_snapshot(), marked);

        // switching back restores the page and spawns nothing
        let transfer = switch_to(0).unwrap();
        assert_eq!(transfer, Transfer::None);
        assert_eq!(screen_snapshot(), marked);
        assert_eq!(crate::mem::paging::visible_terminal(), Some(0));
    }

    #[test]
    fn switch_to_active_terminal_is_a_no_op() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();
        crate::boot().unwrap();

        let generation = crate::mem::paging::apply_generation();
        assert_eq!(switch_to(0).unwrap(), Transfer::None);
        assert_eq!(crate::mem::paging::apply_generation(), generation);
    }

    #[test]
    fn shell_launched_flag_never_reverts() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();
        crate::boot().unwrap();

        switch_to(2).unwrap();
        switch_to(0).unwrap();
        switch_to(2).unwrap();
        assert!(shell_launched(0));
        assert!(shell_launched(2));
        assert!(!shell_launched(1));
    }

    #[test]
    fn clear_resets_page_and_line() {
        let _guard = crate::test::lock();
        crate::test::init_kernel();

        write_bytes(0, b"junk").unwrap();
        input_char(b'j');
        clear_active();

        assert!(screen_snapshot().iter().all(|b| *b == 0));
        assert_eq!(TERMINALS.lock().sessions[0].line_len, 0);
    }
}
