use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out mirror base URLs in global round-robin order across all attempts.
#[derive(Debug)]
pub struct MirrorSelector {
    mirrors: Vec<String>,
    counter: AtomicUsize,
}

impl MirrorSelector {
    /// Returns `None` when there is nothing to rotate through.
    pub fn new(mirrors: Vec<String>) -> Option<Self> {
        if mirrors.is_empty() {
            return None;
        }
        Some(Self {
            mirrors,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn next(&self) -> &str {
        let slot = self.counter.fetch_add(1, Ordering::Relaxed);
        &self.mirrors[slot % self.mirrors.len()]
    }

    pub fn mirror_count(&self) -> usize {
        self.mirrors.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;

    fn mirrors(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://m{i}")).collect()
    }

    #[test]
    fn rejects_empty_mirror_list() {
        assert!(MirrorSelector::new(Vec::new()).is_none());
    }

    #[test]
    fn rotates_in_order() {
        let selector = MirrorSelector::new(mirrors(3)).unwrap();
        let picked: Vec<&str> = (0..7).map(|_| selector.next()).collect();
        assert_eq!(
            picked,
            ["http://m0", "http://m1", "http://m2", "http://m0", "http://m1", "http://m2", "http://m0"]
        );
        assert_eq!(selector.mirror_count(), 3);
    }

    #[test]
    fn spreads_evenly_across_threads() {
        let selector = Arc::new(MirrorSelector::new(mirrors(4)).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let selector = Arc::clone(&selector);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| selector.next().to_owned())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for url in handle.join().unwrap() {
                *counts.entry(url).or_default() += 1;
            }
        }
        // 800 atomic draws over 4 mirrors land exactly 200 on each.
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&n| n == 200));
    }
}
