//! Parallel composition of many permutations
//!
//! Composition is a pure function of its inputs, so independent requests run
//! on scoped worker threads fed through a channel. Requests that resolve to
//! the same permutation key are composed once and share the result.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded};

use crate::assemble::ComposedShader;
use crate::cache::ShaderVariantCache;
use crate::key::PermutationKey;
use crate::light::{LightDescriptor, LitOptions};
use crate::variants::LightVariantBuilder;
use crate::{ComposeError, LightComposer};

/// Inputs of one composition
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub lights: Vec<LightDescriptor>,
    pub options: LitOptions,
}

impl ComposeRequest {
    pub fn new(lights: Vec<LightDescriptor>, options: LitOptions) -> Self {
        Self { lights, options }
    }
}

type Outcome = Result<Arc<ComposedShader>, ComposeError>;

/// Outcome of each request, falling back to the request that shares its key
fn collect_outcomes(results: &[Option<Outcome>], representative: &[usize]) -> Vec<Outcome> {
    results
        .iter()
        .enumerate()
        .map(|(i, outcome)| {
            outcome
                .clone()
                .or_else(|| results[representative[i]].clone())
                .unwrap_or(Err(ComposeError::MissingResult { request: i }))
        })
        .collect()
}

/// Composes batches of requests on worker threads
pub struct BatchComposer<'a> {
    composer: &'a LightComposer,
    workers: usize,
}

impl<'a> BatchComposer<'a> {
    /// Use the composer's configured worker count
    pub fn new(composer: &'a LightComposer) -> Self {
        Self {
            composer,
            workers: composer.config().workers.max(1),
        }
    }

    /// Override the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Compose every request, results in request order
    pub fn compose_all(&self, requests: &[ComposeRequest]) -> Vec<Outcome> {
        let mut results: Vec<Option<Outcome>> = vec![None; requests.len()];
        let mut representative: Vec<usize> = (0..requests.len()).collect();
        let mut first_by_key: HashMap<PermutationKey, usize> = HashMap::new();
        let mut jobs = Vec::new();

        for (i, request) in requests.iter().enumerate() {
            match self.composer.permutation_key(&request.lights, &request.options) {
                Err(e) => results[i] = Some(Err(e)),
                Ok(key) => match first_by_key.entry(key) {
                    Entry::Occupied(first) => representative[i] = *first.get(),
                    Entry::Vacant(slot) => {
                        slot.insert(i);
                        jobs.push(i);
                    }
                },
            }
        }

        if !jobs.is_empty() {
            let workers = self.workers.min(jobs.len());
            log::debug!(
                "Composing {} unique variants of {} requests on {} workers",
                jobs.len(),
                requests.len(),
                workers
            );

            let (job_tx, job_rx) = bounded(jobs.len());
            for &job in &jobs {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);

            let (result_tx, result_rx) = unbounded();
            let composer = self.composer;
            thread::scope(|scope| {
                for _ in 0..workers {
                    let job_rx = job_rx.clone();
                    let result_tx = result_tx.clone();
                    scope.spawn(move || {
                        for i in job_rx.iter() {
                            let request = &requests[i];
                            let outcome = composer
                                .compose(&request.lights, &request.options)
                                .map(Arc::new);
                            if result_tx.send((i, outcome)).is_err() {
                                break;
                            }
                        }
                    });
                }
            });
            drop(result_tx);

            for (i, outcome) in result_rx.try_iter() {
                results[i] = Some(outcome);
            }
        }

        collect_outcomes(&results, &representative)
    }

    /// Compose and submit single-light variants the cache has not seen
    ///
    /// Returns how many variants were submitted.
    pub fn prewarm(
        &self,
        variants: LightVariantBuilder,
        options: &LitOptions,
        cache: &dyn ShaderVariantCache,
    ) -> Result<usize, ComposeError> {
        let mut requests = Vec::new();
        for light in variants.build() {
            let lights = vec![light];
            let key = self.composer.permutation_key(&lights, options)?;
            if !cache.contains(&key) {
                requests.push(ComposeRequest::new(lights, *options));
            }
        }

        let mut submitted = 0;
        for outcome in self.compose_all(&requests) {
            let shader = outcome?;
            cache.submit(Arc::try_unwrap(shader).unwrap_or_else(|shared| (*shared).clone()));
            submitted += 1;
        }

        log::info!("Pre-warmed {} light variants", submitted);
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::VariantRegistry;
    use crate::light::{LightType, ShadowAlgorithm, ShadowSettings};
    use crate::ComposerConfig;

    #[test]
    fn test_results_in_request_order() {
        let composer = LightComposer::new(ComposerConfig::default());
        let requests = vec![
            ComposeRequest::new(vec![LightDescriptor::spot()], LitOptions::default()),
            ComposeRequest::new(vec![LightDescriptor::omni()], LitOptions::default()),
            ComposeRequest::new(vec![LightDescriptor::directional()], LitOptions::default()),
        ];
        let results = BatchComposer::new(&composer).with_workers(3).compose_all(&requests);

        assert_eq!(results.len(), 3);
        for (request, result) in requests.iter().zip(&results) {
            let expected = composer.compose(&request.lights, &request.options).unwrap();
            assert_eq!(result.as_ref().unwrap().source, expected.source);
        }
    }

    #[test]
    fn test_duplicate_keys_share_result() {
        let composer = LightComposer::new(ComposerConfig::default());
        let request = ComposeRequest::new(vec![LightDescriptor::omni()], LitOptions::default());
        let results = BatchComposer::new(&composer).compose_all(&[request.clone(), request]);

        let a = results[0].as_ref().unwrap();
        let b = results[1].as_ref().unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_errors_stay_with_their_request() {
        let composer = LightComposer::new(ComposerConfig::default());
        let bad = LightDescriptor::omni().with_shadow(ShadowSettings::new(ShadowAlgorithm::Pcf5));
        let requests = vec![
            ComposeRequest::new(vec![LightDescriptor::spot()], LitOptions::default()),
            ComposeRequest::new(vec![bad], LitOptions::default()),
        ];
        let results = BatchComposer::new(&composer).compose_all(&requests);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ComposeError::InvalidCombination { slot: 0, .. })));
    }

    #[test]
    fn test_prewarm_skips_cached() {
        let composer = LightComposer::new(ComposerConfig::default());
        let registry = VariantRegistry::new();
        let batch = BatchComposer::new(&composer).with_workers(2);
        let options = LitOptions::default();

        let omni_only = || LightVariantBuilder::new().with_types(&[LightType::Omni]);
        assert_eq!(batch.prewarm(omni_only(), &options, &registry).unwrap(), 1);
        assert_eq!(batch.prewarm(omni_only(), &options, &registry).unwrap(), 0);
        assert_eq!(batch.prewarm(LightVariantBuilder::new(), &options, &registry).unwrap(), 2);
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn test_missing_result_names_request() {
        let composer = LightComposer::new(ComposerConfig::default());
        let shader = Arc::new(composer.compose(&[LightDescriptor::spot()], &LitOptions::default()).unwrap());
        let results = vec![Some(Ok(shader)), None, None];
        let outcomes = collect_outcomes(&results, &[0, 0, 2]);

        assert!(outcomes[0].is_ok());
        assert!(Arc::ptr_eq(outcomes[0].as_ref().unwrap(), outcomes[1].as_ref().unwrap()));
        assert_eq!(outcomes[2].as_ref().unwrap_err(), &ComposeError::MissingResult { request: 2 });
        assert_eq!(
            ComposeError::MissingResult { request: 2 }.to_string(),
            "Batch request 2 produced no result"
        );
    }

    #[test]
    fn test_empty_batch() {
        let composer = LightComposer::new(ComposerConfig::default());
        assert!(BatchComposer::new(&composer).compose_all(&[]).is_empty());
    }
}
