//! Helpers for reporting a panic caught at a task's execution boundary.
//!
//! By the time `catch_unwind` returns, the panicking frames are gone. The
//! stack is therefore captured by a panic hook, on the panicking thread, and
//! parked in a thread-local until the task boundary reports it. Capture only
//! happens inside a [`PanicCaptureScope`], so panics elsewhere in the process
//! pay nothing extra.

use crate::logger::Logger;

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::sync::Once;

/// Number of call-stack frames kept in a panic report.
pub(crate) const STACK_DEPTH: usize = 10;

static PANIC_HOOK_INIT: Once = Once::new();

thread_local! {
  static CAPTURE_ENABLED: Cell<bool> = const { Cell::new(false) };
  static PANIC_STACK: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

/// Chains a hook in front of whatever panic hook is already installed.
/// Runs at most once per process.
pub(crate) fn install_panic_hook() {
  PANIC_HOOK_INIT.call_once(|| {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
      if CAPTURE_ENABLED.with(Cell::get) {
        let stack = Backtrace::force_capture();
        PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
      }
      previous(info);
    }));
  });
}

/// Enables stack capture on the current thread until dropped.
///
/// Async tasks must enter it around every poll, since each poll may land on a
/// different worker thread.
pub(crate) struct PanicCaptureScope {
  was_enabled: bool,
}

impl PanicCaptureScope {
  pub(crate) fn enter() -> Self {
    let was_enabled = CAPTURE_ENABLED.with(|enabled| enabled.replace(true));
    Self { was_enabled }
  }
}

impl Drop for PanicCaptureScope {
  fn drop(&mut self) {
    let was_enabled = self.was_enabled;
    CAPTURE_ENABLED.with(|enabled| enabled.set(was_enabled));
  }
}

fn take_panic_stack() -> Option<Backtrace> {
  PANIC_STACK.with(|slot| slot.borrow_mut().take())
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}

/// Renders `rendered` starting at the frame that raised the panic, keeping at
/// most `max_frames` frames. Hook and unwinding-machinery frames on top are
/// skipped.
fn panic_site_frames(rendered: &str, max_frames: usize) -> String {
  let frames = split_frames(rendered);
  if frames.is_empty() {
    // "disabled backtrace" / "unsupported backtrace"
    return format!("{}\n", rendered.trim_end());
  }

  let first_machinery = frames.iter().position(|frame| is_panic_machinery(frame));
  let start = match first_machinery {
    Some(first) => frames[first..]
      .iter()
      .position(|frame| !is_panic_machinery(frame))
      .map_or(frames.len(), |offset| first + offset),
    None => 0,
  };

  let mut out = String::new();
  for frame in frames[start..].iter().take(max_frames) {
    out.push_str(frame);
  }
  if frames.len() - start > max_frames {
    out.push_str("  ...\n");
  }
  out
}

// One entry per frame header, each including its inlined-symbol and
// location lines.
fn split_frames(rendered: &str) -> Vec<String> {
  let mut frames: Vec<String> = Vec::new();
  for line in rendered.lines() {
    if is_frame_header(line) {
      frames.push(String::new());
    }
    if let Some(frame) = frames.last_mut() {
      frame.push_str(line);
      frame.push('\n');
    }
  }
  frames
}

// Frame headers render as "  12: symbol::path".
fn is_frame_header(line: &str) -> bool {
  let trimmed = line.trim_start();
  let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
  digits > 0 && trimmed[digits..].starts_with(':')
}

fn is_panic_machinery(frame: &str) -> bool {
  frame.contains("std::panicking::")
    || frame.contains("core::panicking::")
    || frame.contains("rust_begin_unwind")
    || frame.contains("__rust_end_short_backtrace")
}

pub(crate) fn report_panic(logger: &dyn Logger, payload: &(dyn Any + Send)) {
  let message = panic_message(payload);
  let stack = match take_panic_stack() {
    Some(backtrace) => panic_site_frames(&backtrace.to_string(), STACK_DEPTH),
    // Someone replaced the process panic hook after ours was installed.
    None => "panic site stack unavailable\n".to_string(),
  };
  logger.printf(format_args!("recover panic[{}] and exit - {}", message, stack));
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fmt;

  #[derive(Default)]
  struct CapturingLogger {
    lines: parking_lot::Mutex<Vec<String>>,
  }

  impl Logger for CapturingLogger {
    fn printf(&self, args: fmt::Arguments<'_>) {
      self.lines.lock().push(args.to_string());
    }
  }

  #[inline(never)]
  fn fail_at_marked_site() {
    panic!("marked site failure");
  }

  #[test]
  fn panic_message_handles_str_and_string_payloads() {
    let static_payload: Box<dyn Any + Send> = Box::new("static boom");
    assert_eq!(panic_message(static_payload.as_ref()), "static boom");

    let owned_payload: Box<dyn Any + Send> = Box::new(format!("owned boom {}", 7));
    assert_eq!(panic_message(owned_payload.as_ref()), "owned boom 7");

    let other_payload: Box<dyn Any + Send> = Box::new(42u32);
    assert_eq!(panic_message(other_payload.as_ref()), "unknown panic");
  }

  #[test]
  fn payload_from_real_panic() {
    let payload = std::panic::catch_unwind(|| panic!("caught {}", "here")).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "caught here");
  }

  #[test]
  fn report_starts_at_the_panicking_function() {
    install_panic_hook();
    let logger = CapturingLogger::default();

    let payload = {
      let _scope = PanicCaptureScope::enter();
      std::panic::catch_unwind(fail_at_marked_site).unwrap_err()
    };
    report_panic(&logger, payload.as_ref());

    let lines = logger.lines.lock();
    assert_eq!(lines.len(), 1);
    let report = &lines[0];
    assert!(report.starts_with("recover panic[marked site failure] and exit - "));
    assert!(report.contains("fail_at_marked_site"), "panic site missing from {}", report);
    assert!(!report.contains("report_panic"));
    assert!(!report.contains("std::panicking::"));
  }

  #[test]
  fn nothing_is_captured_outside_a_scope() {
    install_panic_hook();
    let _ = std::panic::catch_unwind(|| panic!("unscoped"));
    assert!(take_panic_stack().is_none());
  }

  #[test]
  fn scope_restores_previous_state() {
    assert!(!CAPTURE_ENABLED.with(Cell::get));
    {
      let _outer = PanicCaptureScope::enter();
      {
        let _inner = PanicCaptureScope::enter();
      }
      assert!(CAPTURE_ENABLED.with(Cell::get));
    }
    assert!(!CAPTURE_ENABLED.with(Cell::get));
  }

  #[test]
  fn machinery_frames_on_top_are_skipped() {
    let rendered = "   0: worker_pool::recovery::install_panic_hook::{{closure}}\n\
                    \x20  1: std::panicking::rust_panic_with_hook\n\
                    \x20  2: std::sys::backtrace::__rust_end_short_backtrace\n\
                    \x20  3: core::panicking::panic_fmt\n\
                    \x20  4: app::handler\n\
                    \x20            at src/app.rs:10:5\n\
                    \x20  5: app::caller\n\
                    \x20  6: std::panicking::catch_unwind\n";
    let frames = panic_site_frames(rendered, 2);
    assert!(frames.starts_with("   4: app::handler\n"));
    assert!(frames.contains("at src/app.rs:10:5"));
    assert!(frames.contains("app::caller"));
    assert!(!frames.contains("catch_unwind"));
    assert!(frames.ends_with("  ...\n"));
  }

  #[test]
  fn short_and_unsupported_stacks() {
    assert_eq!(panic_site_frames("   0: only\n", STACK_DEPTH), "   0: only\n");
    assert_eq!(panic_site_frames("disabled backtrace", STACK_DEPTH), "disabled backtrace\n");
  }

  #[test]
  fn frame_header_detection() {
    assert!(is_frame_header("  12: worker_pool::pool::launch"));
    assert!(!is_frame_header("             at src/pool.rs:10:5"));
    assert!(!is_frame_header("disabled backtrace"));
  }
}
