/// Turns a `Result` into an `Option`, logging the error as a warning.
///
/// Used where a failure must not abort the surrounding operation, e.g. when
/// releasing the watch of a cgroup directory that the kernel already dropped.
pub trait ResultOkLogExt<T, E> {
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        self.inspect_err(|err| log::warn!("{err}")).ok()
    }
}
