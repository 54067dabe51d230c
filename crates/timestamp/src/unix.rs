const NANOS_PER_SEC: u64 = 1_000_000_000;

pub(crate) fn monotonic_nanos() -> u64 {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    // SAFETY: `now` is a valid, writable timespec for the duration of the call.
    if unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut now) } != 0 {
        tracing::warn!(
            "clock_gettime(CLOCK_MONOTONIC) failed: {}",
            std::io::Error::last_os_error()
        );
        return 0;
    }

    (now.tv_sec as u64) * NANOS_PER_SEC + now.tv_nsec as u64
}
