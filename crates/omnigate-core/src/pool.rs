use std::sync::Mutex;

/// A bounded freelist of reusable `T`s. Checkout either pops a recycled
/// instance or builds a fresh one; release pushes it back unless the pool
/// is already at `max_idle`, in which case the instance is simply dropped.
///
/// Concurrency-safe: a plain `Mutex<Vec<T>>` is enough here because checkout
/// and release are O(1) and never held across an `.await`.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    build: Box<dyn Fn() -> T + Send + Sync>,
    reset: Box<dyn Fn(&mut T) + Send + Sync>,
}

impl<T> Pool<T> {
    pub fn new(
        initial: usize,
        max_idle: usize,
        build: impl Fn() -> T + Send + Sync + 'static,
        reset: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Self {
        let idle = (0..initial).map(|_| build()).collect();
        Self {
            idle: Mutex::new(idle),
            max_idle,
            build: Box::new(build),
            reset: Box::new(reset),
        }
    }

    pub fn checkout(&self) -> T {
        let popped = self.idle.lock().expect("pool mutex poisoned").pop();
        match popped {
            Some(mut item) => {
                (self.reset)(&mut item);
                item
            }
            None => (self.build)(),
        }
    }

    pub fn release(&self, item: T) {
        let mut idle = self.idle.lock().expect("pool mutex poisoned");
        if idle.len() < self.max_idle {
            idle.push(item);
        }
    }

    pub fn idle_len(&self) -> usize {
        self.idle.lock().expect("pool mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn checkout_reuses_released_instances() {
        let built = Arc::new(AtomicUsize::new(0));
        let built_clone = built.clone();
        let pool: Pool<Vec<u8>> = Pool::new(
            0,
            4,
            move || {
                built_clone.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            },
            |v: &mut Vec<u8>| v.clear(),
        );

        let mut item = pool.checkout();
        item.push(1);
        pool.release(item);

        let item = pool.checkout();
        assert!(item.is_empty());
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_beyond_max_idle_is_dropped() {
        let pool: Pool<u8> = Pool::new(0, 1, || 0, |_| {});
        pool.release(1);
        pool.release(2);
        assert_eq!(pool.idle_len(), 1);
    }
}
