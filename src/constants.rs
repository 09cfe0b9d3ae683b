//! Global constants for glint
//!
//! Timing defaults, escape sequences and protocol sizes shared by
//! the event loop, the selection engine and the input handlers.

// ============================================================================
// Timing Constants
// ============================================================================

/// Double-click detection threshold in milliseconds
pub const DOUBLE_CLICK_THRESHOLD_MS: u64 = 300;

/// Triple-click detection threshold in milliseconds (measured from the click before last)
pub const TRIPLE_CLICK_THRESHOLD_MS: u64 = 600;

/// Cursor/text blink interval in milliseconds (0 disables blinking)
pub const BLINK_INTERVAL_MS: u64 = 800;

/// Frame rate while the display connection is active
pub const ACTIVE_FPS: u32 = 120;

/// Frame rate while idle
pub const IDLE_FPS: u32 = 30;

/// Stalled chunked selection transfers are dropped after this long
pub const TRANSFER_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// Selection Protocol
// ============================================================================

/// Property read size, in 32-bit units (BUFSIZ / 4)
pub const PROPERTY_CHUNK_WORDS: u32 = 2048;

/// Bracketed paste start marker
pub const PASTE_BEGIN: &[u8] = b"\x1b[200~";

/// Bracketed paste end marker
pub const PASTE_END: &[u8] = b"\x1b[201~";

// ============================================================================
// Focus Reporting
// ============================================================================

/// Sent on focus-in when focus reporting (?1004) is on
pub const FOCUS_IN: &[u8] = b"\x1b[I";

/// Sent on focus-out when focus reporting (?1004) is on
pub const FOCUS_OUT: &[u8] = b"\x1b[O";

// ============================================================================
// Font Size Limits
// ============================================================================

/// Minimum font size (pixels)
pub const MIN_FONT_SIZE: f32 = 6.0;

/// Maximum font size (pixels)
pub const MAX_FONT_SIZE: f32 = 72.0;

/// Zoom step (pixels)
pub const ZOOM_STEP: f32 = 1.0;

/// Upper bound on bytes consumed from the PTY per loop iteration
pub const PTY_READ_BUDGET: usize = 64 * 1024;
