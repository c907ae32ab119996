/// A monotonic nanosecond clock used to pace emulation against real time.
pub trait TimeSource {
    fn time_ns(&self) -> u64;
}
