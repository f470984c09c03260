use std::sync::atomic::{AtomicBool, Ordering};

static STOP: AtomicBool = AtomicBool::new(false);

/// True once the process has been asked to stop. The daemon loop polls this
/// between ticks and exits cleanly instead of dying mid-backup.
pub fn shutdown_requested() -> bool {
    STOP.load(Ordering::SeqCst)
}

/// Arrange for the first SIGINT/SIGTERM (console control event on Windows)
/// to request a cooperative stop. The handler then steps aside, so a second
/// signal terminates the process the usual way.
pub fn install() {
    #[cfg(unix)]
    unsafe {
        // Safety: the handler only stores an atomic and re-registers SIG_DFL.
        for sig in [libc::SIGINT, libc::SIGTERM] {
            libc::signal(sig, request_stop as *const () as libc::sighandler_t);
        }
    }

    #[cfg(windows)]
    unsafe {
        windows_sys::Win32::System::Console::SetConsoleCtrlHandler(Some(console_stop), 1);
    }
}

#[cfg(unix)]
extern "C" fn request_stop(sig: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
    }
}

#[cfg(windows)]
unsafe extern "system" fn console_stop(ctrl_type: u32) -> i32 {
    // Ctrl+C (0), Ctrl+Break (1) and console close (2) all request a stop;
    // logoff/shutdown events are left to the system.
    if ctrl_type <= 2 {
        STOP.store(true, Ordering::SeqCst);
        windows_sys::Win32::System::Console::SetConsoleCtrlHandler(Some(console_stop), 0);
        return 1;
    }
    0
}
