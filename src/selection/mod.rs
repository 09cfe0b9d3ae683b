//! Selection and clipboard engine
//!
//! Handles:
//! - Mouse-driven selection (see [`state`]) committed to PRIMARY on release
//! - CLIPBOARD copy from PRIMARY
//! - Pastes from other clients, including incremental (INCR) delivery,
//!   forwarded to the child with bracketed-paste markers when enabled
//! - Serving our PRIMARY/CLIPBOARD to other clients

pub mod clipboard;
pub mod state;
pub mod transfer;

use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info, trace, warn};

use crate::config::Config;
use crate::constants::{PASTE_BEGIN, PASTE_END, PROPERTY_CHUNK_WORDS};
use crate::display::{
    Atom, PropertyData, SelectionRequest, SelectionTransport, CURRENT_TIME,
};
use crate::terminal::pty::ProcessChannel;
use crate::terminal::Terminal;

pub use clipboard::{Clipboards, SelectionBuffer, SelectionKind};
pub use state::{Point, SelMode, SelType, Selection, Snap};
pub use transfer::TransferIn;

pub struct SelectionEngine {
    pub sel: Selection,
    pub buffers: Clipboards,
    transfer: Option<TransferIn>,
    timeout: Duration,
}

impl SelectionEngine {
    pub fn new(sel: Selection, timeout: Duration) -> Self {
        Self {
            sel,
            buffers: Clipboards::default(),
            transfer: None,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let timing = &config.timing;
        let sel = Selection::new(
            &config.selection.word_delimiters,
            timing.double_click(),
            timing.triple_click(),
        );
        Self::new(sel, timing.transfer_timeout())
    }

    pub fn is_transferring(&self) -> bool {
        self.transfer.is_some()
    }

    /// Time until an in-flight incremental paste would be abandoned
    pub fn transfer_deadline(&self, now: Instant) -> Option<Duration> {
        self.transfer
            .as_ref()
            .map(|tr| tr.remaining(now, self.timeout))
    }

    // ========== Local selection ==========

    /// Button-1 release: commit the selected text to PRIMARY and claim it
    pub fn release<T: SelectionTransport>(
        &mut self,
        t: &mut T,
        term: &mut Terminal,
        col: usize,
        row: usize,
        rectangular: bool,
        time: u32,
    ) {
        let Some(text) = self.sel.release(term, col, row, rectangular) else {
            return;
        };
        debug!("Selection committed: {} bytes", text.len());
        self.buffers.primary.set(text.into_bytes());

        let primary = t.atoms().primary;
        if !claim(t, primary, time) {
            self.sel.clear(term);
        }
    }

    /// Copy PRIMARY into CLIPBOARD and claim it; no-op without a selection
    pub fn clip_copy<T: SelectionTransport>(&mut self, t: &mut T) {
        if !self.buffers.copy_primary() {
            debug!("Clipboard copy: nothing selected");
            return;
        }
        let clipboard = t.atoms().clipboard;
        claim(t, clipboard, CURRENT_TIME);
    }

    /// Another client took a selection we owned
    pub fn on_selection_clear<T: SelectionTransport>(
        &mut self,
        t: &T,
        term: &mut Terminal,
        selection: Atom,
    ) {
        if selection == t.atoms().primary {
            debug!("PRIMARY taken by another client");
            self.sel.clear(term);
            self.buffers.primary.clear();
        } else {
            trace!("Selection {} cleared", selection);
        }
    }

    // ========== Inbound paste ==========

    /// Ask the owner of `kind` to convert it into our property of the
    /// same name
    pub fn paste<T: SelectionTransport, P: ProcessChannel>(
        &mut self,
        t: &mut T,
        chan: &mut P,
        kind: SelectionKind,
        time: u32,
    ) -> Result<()> {
        if let Some(tr) = self.transfer.take() {
            warn!(
                "Paste requested during transfer ({} bytes received), abandoning it",
                tr.bytes
            );
            abandon(t, chan, tr)?;
        }
        let atoms = t.atoms();
        let selection = match kind {
            SelectionKind::Primary => atoms.primary,
            SelectionKind::Clipboard => atoms.clipboard,
        };
        if let Err(e) = t.convert_selection(selection, atoms.text, selection, time) {
            warn!("Failed to request {:?} conversion: {}", kind, e);
        }
        Ok(())
    }

    /// Conversion result from the owner
    pub fn on_selection_notify<T: SelectionTransport, P: ProcessChannel>(
        &mut self,
        t: &mut T,
        chan: &mut P,
        property: Option<Atom>,
        bracketed: bool,
        now: Instant,
    ) -> Result<()> {
        let Some(property) = property else {
            debug!("Selection owner refused conversion");
            return Ok(());
        };
        self.drain(t, chan, property, bracketed, now)
    }

    /// New data in one of our properties during an incremental paste
    pub fn on_property_notify<T: SelectionTransport, P: ProcessChannel>(
        &mut self,
        t: &mut T,
        chan: &mut P,
        atom: Atom,
        new_value: bool,
        bracketed: bool,
        now: Instant,
    ) -> Result<()> {
        let atoms = t.atoms();
        if !new_value || (atom != atoms.primary && atom != atoms.clipboard) {
            return Ok(());
        }
        match &self.transfer {
            Some(tr) if tr.incremental && tr.property == atom => {
                self.drain(t, chan, atom, bracketed, now)
            }
            _ => {
                trace!("Ignoring property change on {} outside a transfer", atom);
                Ok(())
            }
        }
    }

    /// Drop an incremental paste whose owner went quiet
    pub fn expire_stalled<T: SelectionTransport, P: ProcessChannel>(
        &mut self,
        t: &mut T,
        chan: &mut P,
        now: Instant,
    ) -> Result<()> {
        match self.transfer.take() {
            Some(tr) if tr.stalled(now, self.timeout) => {
                warn!(
                    "Incremental paste stalled after {} bytes in {} chunks, abandoning",
                    tr.bytes, tr.chunks
                );
                abandon(t, chan, tr)
            }
            other => {
                self.transfer = other;
                Ok(())
            }
        }
    }

    /// Read everything currently in `property` and forward it
    fn drain<T: SelectionTransport, P: ProcessChannel>(
        &mut self,
        t: &mut T,
        chan: &mut P,
        property: Atom,
        bracketed: bool,
        now: Instant,
    ) -> Result<()> {
        let atoms = t.atoms();
        let mut tr = self
            .transfer
            .take()
            .unwrap_or_else(|| TransferIn::new(property, now));
        let mut offset = 0u32;

        loop {
            let chunk = match t.read_property(property, offset, PROPERTY_CHUNK_WORDS) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Clipboard property read failed: {}", e);
                    return abandon(t, chan, tr);
                }
            };

            if chunk.type_ == atoms.incr {
                // Owner will deliver in pieces, each announced by a
                // property change once we delete this one
                debug!("Incremental paste started");
                tr.incremental = true;
                tr.touch(now);
                self.transfer = Some(tr);
                if let Err(e) = t.watch_property_changes(true) {
                    warn!("Failed to watch property changes: {}", e);
                }
                delete(t, property);
                return Ok(());
            }

            if tr.incremental && chunk.data.is_empty() && chunk.bytes_after == 0 {
                // Zero-length chunk terminates
                if let Err(e) = t.watch_property_changes(false) {
                    warn!("Failed to stop watching property changes: {}", e);
                }
                delete(t, property);
                return finish(chan, tr);
            }

            if !chunk.data.is_empty() {
                if bracketed && !tr.bracket_open {
                    chan.send(PASTE_BEGIN)?;
                    tr.bracket_open = true;
                }
                let data: Vec<u8> = chunk
                    .data
                    .iter()
                    .map(|&b| if b == b'\n' { b'\r' } else { b })
                    .collect();
                chan.send(&data)?;
                tr.progress(data.len(), now);
            }

            offset += (chunk.data.len() / 4) as u32;
            if chunk.bytes_after == 0 {
                break;
            }
        }

        delete(t, property);
        if tr.incremental {
            trace!("Incremental chunk {} received", tr.chunks);
            self.transfer = Some(tr);
            Ok(())
        } else {
            finish(chan, tr)
        }
    }

    // ========== Outbound ==========

    /// Serve one of our selections to a requestor. A notification is
    /// always sent; it carries no property when the request could not
    /// be satisfied.
    pub fn on_selection_request<T: SelectionTransport>(&self, t: &mut T, req: &SelectionRequest) {
        let atoms = t.atoms();
        let property = req.property.unwrap_or(req.target);
        let mut reply = None;

        if req.target == atoms.targets {
            match t.write_property(
                req.requestor,
                property,
                atoms.atom,
                PropertyData::Atoms(&[atoms.text]),
            ) {
                Ok(()) => reply = Some(property),
                Err(e) => warn!("Failed to answer TARGETS: {}", e),
            }
        } else if req.target == atoms.text || req.target == atoms.string {
            let buffer = if req.selection == atoms.primary {
                Some(self.buffers.get(SelectionKind::Primary))
            } else if req.selection == atoms.clipboard {
                Some(self.buffers.get(SelectionKind::Clipboard))
            } else {
                warn!("Request for unhandled selection {}", req.selection);
                None
            };
            if let Some(Some(bytes)) = buffer {
                match t.write_property(
                    req.requestor,
                    property,
                    req.target,
                    PropertyData::Bytes(bytes),
                ) {
                    Ok(()) => {
                        debug!("Served {} bytes to 0x{:x}", bytes.len(), req.requestor);
                        reply = Some(property);
                    }
                    Err(e) => warn!("Failed to serve selection: {}", e),
                }
            }
        } else {
            debug!("Unsupported selection target {}", req.target);
        }

        if let Err(e) = t.notify_selection(req, reply) {
            warn!("Failed to notify requestor 0x{:x}: {}", req.requestor, e);
        }
    }
}

/// Take ownership of `selection`; false when someone else holds it after
fn claim<T: SelectionTransport>(t: &mut T, selection: Atom, time: u32) -> bool {
    if let Err(e) = t.set_selection_owner(selection, time) {
        warn!("Failed to claim selection {}: {}", selection, e);
        return false;
    }
    match t.selection_owned(selection) {
        Ok(true) => true,
        Ok(false) => {
            warn!("Selection {} claimed by another client", selection);
            false
        }
        Err(e) => {
            warn!("Failed to query selection owner: {}", e);
            false
        }
    }
}

fn delete<T: SelectionTransport>(t: &mut T, property: Atom) {
    if let Err(e) = t.delete_property(property) {
        warn!("Failed to delete property {}: {}", property, e);
    }
}

/// Stop an unfinished paste, closing any open bracket
fn abandon<T: SelectionTransport, P: ProcessChannel>(
    t: &mut T,
    chan: &mut P,
    tr: TransferIn,
) -> Result<()> {
    if tr.incremental {
        if let Err(e) = t.watch_property_changes(false) {
            warn!("Failed to stop watching property changes: {}", e);
        }
    }
    if tr.bracket_open {
        chan.send(PASTE_END)?;
    }
    Ok(())
}

fn finish<P: ProcessChannel>(chan: &mut P, tr: TransferIn) -> Result<()> {
    if tr.bracket_open {
        chan.send(PASTE_END)?;
    }
    info!("Pasted {} bytes", tr.bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::testing::{FakeDisplay, ATOMS, WINDOW};
    use crate::display::PropertyChunk;

    const REQUESTOR: u32 = 0x60_0002;

    fn engine() -> SelectionEngine {
        SelectionEngine::new(Selection::default(), Duration::from_secs(5))
    }

    fn text_chunk(data: &[u8], bytes_after: u32) -> PropertyChunk {
        PropertyChunk {
            type_: ATOMS.text,
            format: 8,
            data: data.to_vec(),
            bytes_after,
        }
    }

    fn incr_header() -> PropertyChunk {
        PropertyChunk {
            type_: ATOMS.incr,
            format: 32,
            data: 9000u32.to_ne_bytes().to_vec(),
            bytes_after: 0,
        }
    }

    fn request(selection: Atom, target: Atom, property: Option<Atom>) -> SelectionRequest {
        SelectionRequest {
            requestor: REQUESTOR,
            selection,
            target,
            property,
            time: 0,
        }
    }

    #[test]
    fn test_simple_paste_converts_newlines() {
        let mut e = engine();
        let mut d = FakeDisplay::new();
        let mut out = Vec::new();
        let now = Instant::now();

        e.paste(&mut d, &mut out, SelectionKind::Clipboard, 0).unwrap();
        assert_eq!(d.converts, vec![(ATOMS.clipboard, ATOMS.text, ATOMS.clipboard)]);

        d.serve(ATOMS.clipboard, text_chunk(b"ls\necho hi\n", 0));
        e.on_selection_notify(&mut d, &mut out, Some(ATOMS.clipboard), false, now)
            .unwrap();
        assert_eq!(out, b"ls\recho hi\r");
        assert_eq!(d.deleted, vec![ATOMS.clipboard]);
        assert!(!e.is_transferring());
    }

    #[test]
    fn test_paste_spanning_reads_is_bracketed_once() {
        let mut e = engine();
        let mut d = FakeDisplay::new();
        let mut out = Vec::new();
        d.serve(ATOMS.primary, text_chunk(&[b'a'; 8192], 10));
        d.serve(ATOMS.primary, text_chunk(&[b'b'; 10], 0));
        e.on_selection_notify(&mut d, &mut out, Some(ATOMS.primary), true, Instant::now())
            .unwrap();

        let mut expected = PASTE_BEGIN.to_vec();
        expected.extend_from_slice(&[b'a'; 8192]);
        expected.extend_from_slice(&[b'b'; 10]);
        expected.extend_from_slice(PASTE_END);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_refused_conversion_sends_nothing() {
        let mut e = engine();
        let mut d = FakeDisplay::new();
        let mut out = Vec::new();
        e.on_selection_notify(&mut d, &mut out, None, true, Instant::now())
            .unwrap();
        assert!(out.is_empty());
        assert!(d.deleted.is_empty());
    }

    #[test]
    fn test_incremental_paste_in_order_with_single_brackets() {
        let mut e = engine();
        let mut d = FakeDisplay::new();
        let mut out = Vec::new();
        let now = Instant::now();
        let prop = ATOMS.clipboard;

        d.serve(prop, incr_header());
        e.on_selection_notify(&mut d, &mut out, Some(prop), true, now)
            .unwrap();
        assert!(out.is_empty(), "no data before the first chunk");
        assert!(d.watching);
        assert_eq!(d.deleted, vec![prop]);
        assert!(e.is_transferring());

        let big: Vec<u8> = (0..9000).map(|i| b'a' + (i % 26) as u8).collect();
        let chunks: [&[u8]; 3] = [b"x\ny", &big, b"seventeen bytes!!"];

        // Our own deletion is not new data
        e.on_property_notify(&mut d, &mut out, prop, false, true, now)
            .unwrap();
        assert!(out.is_empty());

        for chunk in chunks {
            // A chunk larger than one read arrives in two
            if chunk.len() > 8192 {
                d.serve(prop, text_chunk(&chunk[..8192], (chunk.len() - 8192) as u32));
                d.serve(prop, text_chunk(&chunk[8192..], 0));
            } else {
                d.serve(prop, text_chunk(chunk, 0));
            }
            e.on_property_notify(&mut d, &mut out, prop, true, true, now)
                .unwrap();
        }
        assert!(e.is_transferring());

        d.serve(prop, text_chunk(b"", 0));
        e.on_property_notify(&mut d, &mut out, prop, true, true, now)
            .unwrap();
        assert!(!e.is_transferring());
        assert!(!d.watching);

        let mut expected = PASTE_BEGIN.to_vec();
        expected.extend_from_slice(b"x\ry");
        expected.extend_from_slice(&big);
        expected.extend_from_slice(b"seventeen bytes!!");
        expected.extend_from_slice(PASTE_END);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_stalled_incremental_paste_is_abandoned() {
        let mut e = engine();
        let mut d = FakeDisplay::new();
        let mut out = Vec::new();
        let t0 = Instant::now();
        let prop = ATOMS.primary;

        d.serve(prop, incr_header());
        e.on_selection_notify(&mut d, &mut out, Some(prop), true, t0)
            .unwrap();
        d.serve(prop, text_chunk(b"part", 0));
        e.on_property_notify(&mut d, &mut out, prop, true, true, t0)
            .unwrap();

        e.expire_stalled(&mut d, &mut out, t0 + Duration::from_secs(4))
            .unwrap();
        assert!(e.is_transferring());
        assert_eq!(
            e.transfer_deadline(t0 + Duration::from_secs(4)),
            Some(Duration::from_secs(1))
        );

        e.expire_stalled(&mut d, &mut out, t0 + Duration::from_secs(6))
            .unwrap();
        assert!(!e.is_transferring());
        assert!(!d.watching);
        let mut expected = PASTE_BEGIN.to_vec();
        expected.extend_from_slice(b"part");
        expected.extend_from_slice(PASTE_END);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_failed_read_aborts_transfer() {
        let mut e = engine();
        let mut d = FakeDisplay::new();
        let mut out = Vec::new();
        d.serve(ATOMS.primary, incr_header());
        e.on_selection_notify(&mut d, &mut out, Some(ATOMS.primary), false, Instant::now())
            .unwrap();
        d.fail_reads = true;
        e.on_property_notify(&mut d, &mut out, ATOMS.primary, true, false, Instant::now())
            .unwrap();
        assert!(!e.is_transferring());
        assert!(!d.watching);
        assert!(out.is_empty());
    }

    #[test]
    fn test_targets_request() {
        let e = engine();
        let mut d = FakeDisplay::new();
        let req = request(ATOMS.clipboard, ATOMS.targets, Some(77));
        e.on_selection_request(&mut d, &req);

        assert_eq!(d.written.len(), 1);
        let w = &d.written[0];
        assert_eq!((w.window, w.property, w.type_), (REQUESTOR, 77, ATOMS.atom));
        assert_eq!(w.atoms, vec![ATOMS.text]);
        assert_eq!(d.notified, vec![(req, Some(77))]);
    }

    #[test]
    fn test_request_with_empty_buffer_is_refused() {
        let e = engine();
        let mut d = FakeDisplay::new();
        let req = request(ATOMS.clipboard, ATOMS.text, Some(77));
        e.on_selection_request(&mut d, &req);
        assert!(d.written.is_empty());
        assert_eq!(d.notified, vec![(req, None)]);
    }

    #[test]
    fn test_request_without_property_uses_target() {
        let mut e = engine();
        e.buffers.primary.set(b"hello".to_vec());
        let mut d = FakeDisplay::new();
        let req = request(ATOMS.primary, ATOMS.string, None);
        e.on_selection_request(&mut d, &req);

        let w = &d.written[0];
        assert_eq!((w.property, w.type_), (ATOMS.string, ATOMS.string));
        assert_eq!(w.bytes, b"hello");
        assert_eq!(d.notified, vec![(req, Some(ATOMS.string))]);
    }

    #[test]
    fn test_request_for_unknown_selection_or_target() {
        let mut e = engine();
        e.buffers.primary.set(b"x".to_vec());
        let mut d = FakeDisplay::new();

        let req = request(999, ATOMS.text, Some(5));
        e.on_selection_request(&mut d, &req);
        let req2 = request(ATOMS.primary, 998, Some(5));
        e.on_selection_request(&mut d, &req2);

        assert!(d.written.is_empty());
        assert_eq!(d.notified, vec![(req, None), (req2, None)]);
    }

    #[test]
    fn test_release_commits_primary_and_copy_serves_clipboard() {
        let mut e = engine();
        let mut d = FakeDisplay::new();
        let mut term = Terminal::new(20, 5);
        term.feed(b"\x1b[4;1Hthe quick brown fox");

        e.sel.press(&mut term, 2, 3, Instant::now());
        e.sel.drag(&mut term, 7, 3, false);
        e.release(&mut d, &mut term, 7, 3, false, 42);
        assert_eq!(e.buffers.primary.get(), Some(&b"e quic"[..]));
        assert!(d.owned.contains(&ATOMS.primary));

        e.clip_copy(&mut d);
        assert!(d.owned.contains(&ATOMS.clipboard));

        let req = request(ATOMS.clipboard, ATOMS.text, Some(9));
        e.on_selection_request(&mut d, &req);
        assert_eq!(d.written[0].bytes, b"e quic");
        assert_eq!(d.written[0].window, REQUESTOR);
        assert_ne!(d.written[0].window, WINDOW);
    }

    #[test]
    fn test_clip_copy_without_selection_is_noop() {
        let mut e = engine();
        let mut d = FakeDisplay::new();
        e.clip_copy(&mut d);
        assert!(d.owned.is_empty());
        assert!(e.buffers.clipboard.is_empty());
    }

    #[test]
    fn test_lost_ownership_clears_highlight() {
        let mut e = engine();
        let mut d = FakeDisplay::new();
        d.lose_ownership = true;
        let mut term = Terminal::new(10, 2);
        term.feed(b"abcdef");
        e.sel.press(&mut term, 0, 0, Instant::now());
        e.sel.drag(&mut term, 3, 0, false);
        e.release(&mut d, &mut term, 3, 0, false, 0);

        assert_eq!(e.sel.range(), None);
        assert_eq!(e.buffers.primary.get(), Some(&b"abcd"[..]));
    }

    #[test]
    fn test_selection_clear_drops_primary_only() {
        let mut e = engine();
        let d = FakeDisplay::new();
        let mut term = Terminal::new(10, 2);
        e.buffers.primary.set(b"p".to_vec());
        e.buffers.clipboard.set(b"c".to_vec());

        e.on_selection_clear(&d, &mut term, ATOMS.clipboard);
        assert!(!e.buffers.clipboard.is_empty());
        e.on_selection_clear(&d, &mut term, ATOMS.primary);
        assert!(e.buffers.primary.is_empty());
    }
}
