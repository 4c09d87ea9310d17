use crate::data::Dataset;
use crate::error::{ForecastError, ForecastResult};
use crate::features::{build_training_set, FeatureConfig, TrainingSet};
use crate::math::rmse;
use crate::tree::{train, Model, TreeParams};
use crate::MIN_TRAIN_EXAMPLES;
use log::{debug, info};

/// Owns the train/predict lifecycle: assembler once per training run, one
/// retained model, one scalar forecast on demand. This is the seam where
/// the host UI attaches.
pub struct Forecaster {
    dataset: Option<Dataset>,
    config: Option<FeatureConfig>,
    tree_params: TreeParams,
    training: Option<TrainingSet>,
    model: Option<Model>,
}

impl Forecaster {
    pub fn new() -> Forecaster {
        Forecaster::with_params(TreeParams::default())
    }

    pub fn with_params(tree_params: TreeParams) -> Forecaster {
        Forecaster {
            dataset: None,
            config: None,
            tree_params,
            training: None,
            model: None,
        }
    }

    /// Record the active dataset and target.
    ///
    /// A new target changes the feature layout, so any model trained for a
    /// different target is dropped; reselecting the same target keeps it.
    pub fn select_target(&mut self, dataset: Dataset, column: &str) -> ForecastResult<()> {
        self.select_target_with(dataset, FeatureConfig::new(column))
    }

    /// Same as `select_target`, with explicit lags and cyclic-time flag.
    pub fn select_target_with(
        &mut self,
        dataset: Dataset,
        config: FeatureConfig,
    ) -> ForecastResult<()> {
        if dataset.column_index(&config.target).is_none() {
            return Err(ForecastError::UnknownColumn(config.target.clone()));
        }
        if !dataset.is_numeric(&config.target) {
            return Err(ForecastError::NonNumericColumn(config.target.clone()));
        }
        if config.lags.is_empty() {
            return Err(ForecastError::EmptyLagSet);
        }
        if let Some(&l) = config.lags.iter().find(|&&l| l == 0) {
            return Err(ForecastError::InvalidLag(l));
        }
        if self.config.as_ref() != Some(&config) {
            self.model = None;
            self.training = None;
        }
        self.dataset = Some(dataset);
        self.config = Some(config);
        Ok(())
    }

    /// Assemble the training set and fit a tree.
    ///
    /// Refused below the 20-example floor; a refusal leaves any previously
    /// trained model in place.
    pub fn train(&mut self) -> ForecastResult<()> {
        let dataset = self.dataset.as_ref().ok_or(ForecastError::NoTarget)?;
        let config = self.config.as_ref().ok_or(ForecastError::NoTarget)?;

        let training = build_training_set(dataset, config)?;
        if training.examples.len() < MIN_TRAIN_EXAMPLES {
            return Err(ForecastError::InsufficientData {
                required: MIN_TRAIN_EXAMPLES,
                actual: training.examples.len(),
            });
        }

        debug!(
            "training on {} examples of width {}",
            training.examples.len(),
            training.width
        );
        let model = train(&training.examples, &self.tree_params);
        info!(
            "trained tree for '{}': {} splits, {} leaves",
            config.target,
            model.root.num_splits(),
            model.root.num_leaves()
        );
        self.training = Some(training);
        self.model = Some(model);
        Ok(())
    }

    /// One point forecast for the target at the step after the most recent
    /// observed row.
    pub fn predict_next(&self) -> ForecastResult<f64> {
        let model = self.model.as_ref().ok_or(ForecastError::NotTrained)?;
        let training = self.training.as_ref().ok_or(ForecastError::NotTrained)?;
        let next = training
            .next_vector
            .as_ref()
            .ok_or(ForecastError::InsufficientHistory)?;
        model.predict(next)
    }

    /// RMSE of the trained tree over its own training set.
    pub fn fitted_rmse(&self) -> ForecastResult<f64> {
        let model = self.model.as_ref().ok_or(ForecastError::NotTrained)?;
        let training = self.training.as_ref().ok_or(ForecastError::NotTrained)?;
        let rows: Vec<Vec<f64>> = training
            .examples
            .iter()
            .map(|e| e.features.clone())
            .collect();
        let labels: Vec<f64> = training.examples.iter().map(|e| e.label).collect();
        let yhat = model.predict_batch(&rows)?;
        Ok(rmse(&labels, &yhat))
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }
}

impl Default for Forecaster {
    fn default() -> Forecaster {
        Forecaster::new()
    }
}
