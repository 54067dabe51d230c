use std::{sync::LazyLock, time::Instant};

static ANCHOR: LazyLock<Instant> = LazyLock::new(Instant::now);

pub(crate) fn monotonic_nanos() -> u64 {
    u64::try_from(ANCHOR.elapsed().as_nanos()).unwrap_or(u64::MAX)
}
