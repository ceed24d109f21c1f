use super::{FirstOk, Race};
use crate::error::Panicked;
use crate::operation::Operation;

impl<O, T, E, const N: usize> FirstOk<T, E> for [O; N]
where
    O: Operation<T, E>,
    T: Send + 'static,
    E: From<Panicked> + Send + 'static,
{
    fn first_ok(self) -> Race<T, E> {
        Race::new(self)
    }
}
