use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::engine::models::VersionDescriptor;
use crate::networking::CatalogSource;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("stopped waiting for a new build")]
    Cancelled,
    #[error("universe {0} disappeared from the catalog")]
    UnknownUniverse(String),
}

/// Poll `source` every `every` until `current.name` points at a different manifest.
pub async fn wait_for_new_build<S: CatalogSource>(
    source: &S,
    current: &VersionDescriptor,
    every: Duration,
    cancel: &CancellationToken,
) -> Result<VersionDescriptor, WatchError> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately and `current` is already fresh.
    ticker.tick().await;

    info!(
        "watch: waiting for a build newer than {} {}",
        current.name, current.version
    );
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WatchError::Cancelled),
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WatchError::Cancelled),
            fetched = source.catalog() => fetched,
        };
        let catalog = match fetched {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!("watch: catalog refresh failed: {err}");
                continue;
            }
        };

        let Some(latest) = catalog.universe(&current.name) else {
            return Err(WatchError::UnknownUniverse(current.name.clone()));
        };
        if !latest.is_same_build(current) {
            info!("watch: {} build {} found", latest.name, latest.version);
            return Ok(latest.clone());
        }
        debug!("watch: {} still at {}", current.name, current.version);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::catalog::CatalogError;
    use crate::engine::models::Catalog;
    use crate::networking::FetchError;

    struct ScriptedCatalog {
        responses: Mutex<VecDeque<Result<Catalog, FetchError>>>,
        fallback: Catalog,
        calls: AtomicUsize,
    }

    impl ScriptedCatalog {
        fn new(responses: Vec<Result<Catalog, FetchError>>, fallback: Catalog) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fallback,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CatalogSource for ScriptedCatalog {
        async fn catalog(&self) -> Result<Catalog, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    fn build(index: &str) -> VersionDescriptor {
        VersionDescriptor {
            name: "Test".into(),
            server: "ptu:8000".into(),
            version: format!("2.6.0 - {index}"),
            manifest_location: format!("http://x/{index}.json"),
        }
    }

    fn catalog_with(version: VersionDescriptor) -> Catalog {
        Catalog {
            universes: vec![version],
        }
    }

    #[tokio::test]
    async fn returns_first_different_build() {
        let source = ScriptedCatalog::new(
            vec![
                Ok(catalog_with(build("1"))),
                Err(FetchError::Catalog {
                    url: "http://catalog".into(),
                    source: CatalogError::Empty,
                }),
                Ok(catalog_with(build("2"))),
            ],
            catalog_with(build("1")),
        );

        let found = wait_for_new_build(
            &source,
            &build("1"),
            Duration::from_millis(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(found, build("2"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let source = ScriptedCatalog::new(Vec::new(), catalog_with(build("1")));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = wait_for_new_build(&source, &build("1"), Duration::from_millis(1), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, WatchError::Cancelled));
    }

    #[tokio::test]
    async fn fails_when_universe_disappears() {
        let source = ScriptedCatalog::new(Vec::new(), Catalog::default());

        let err = wait_for_new_build(
            &source,
            &build("1"),
            Duration::from_millis(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WatchError::UnknownUniverse(name) if name == "Test"));
    }
}
