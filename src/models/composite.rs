//! Primary model plus summed backgrounds.

use std::collections::HashSet;

use crate::domain::{ModelKind, Parameter, ScanRange};
use crate::error::FitError;
use crate::models::model::{evaluate, initial_guess};

/// A primary feature model with zero or more background models, summed pointwise.
///
/// Parameters are laid out component by component in `param_names` order, so a
/// flat value slice can be split back into per-component slices.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeModel {
    primary: ModelKind,
    backgrounds: Vec<ModelKind>,
}

impl CompositeModel {
    /// Build a composite, rejecting parameter names shared by two components.
    pub fn new(primary: ModelKind, backgrounds: &[ModelKind]) -> Result<Self, FitError> {
        let mut seen = HashSet::new();
        for component in std::iter::once(&primary).chain(backgrounds.iter()) {
            for name in component.param_names() {
                if !seen.insert(*name) {
                    return Err(FitError::DuplicateParameter((*name).to_string()));
                }
            }
        }
        Ok(Self {
            primary,
            backgrounds: backgrounds.to_vec(),
        })
    }

    /// Resolve names (aliases included) and build the composite.
    pub fn from_names<S: AsRef<str>>(primary: &str, backgrounds: &[S]) -> Result<Self, FitError> {
        let primary = ModelKind::resolve(primary)?;
        let backgrounds = backgrounds
            .iter()
            .map(|b| ModelKind::resolve(b.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(primary, &backgrounds)
    }

    pub fn primary(&self) -> ModelKind {
        self.primary
    }

    pub fn backgrounds(&self) -> &[ModelKind] {
        &self.backgrounds
    }

    fn components(&self) -> impl Iterator<Item = ModelKind> + '_ {
        std::iter::once(self.primary).chain(self.backgrounds.iter().copied())
    }

    pub fn param_count(&self) -> usize {
        self.components().map(|c| c.param_names().len()).sum()
    }

    /// Union of every component's initial guess, in layout order.
    pub fn initial_guess(&self, range: ScanRange) -> Vec<Parameter> {
        self.components().flat_map(|c| initial_guess(c, range)).collect()
    }

    /// Names of the parameters that locate the feature (the primary's center).
    pub fn center_params(&self) -> Vec<&'static str> {
        self.primary.center_param().into_iter().collect()
    }

    /// Evaluate the summed model at `x`.
    ///
    /// # Panics
    /// Panics if `values` is shorter than `param_count()`.
    pub fn evaluate(&self, x: f64, values: &[f64]) -> f64 {
        let mut offset = 0;
        let mut total = 0.0;
        for component in self.components() {
            let len = component.param_names().len();
            total += evaluate(component, x, &values[offset..offset + len]);
            offset += len;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backgrounds_add_pointwise() {
        let model = CompositeModel::new(ModelKind::Gauss, &[ModelKind::Constant, ModelKind::Linear]).unwrap();
        assert_eq!(model.param_count(), 6);
        // gauss(5; 5, 10, 1) + 2 + (0.5 * 5 + 1)
        let y = model.evaluate(5.0, &[5.0, 10.0, 1.0, 2.0, 0.5, 1.0]);
        assert!((y - 15.5).abs() < 1e-12);
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let err = CompositeModel::new(ModelKind::Gauss, &[ModelKind::Linear, ModelKind::Linear]).unwrap_err();
        assert_eq!(err, FitError::DuplicateParameter("m".to_string()));
    }

    #[test]
    fn unknown_background_fails_before_building() {
        let err = CompositeModel::from_names("gauss", &["cubic"]).unwrap_err();
        assert_eq!(err, FitError::UnknownModel("cubic".to_string()));
    }

    #[test]
    fn guess_is_the_union_of_components() {
        let model = CompositeModel::from_names("gaussian", &["constant"]).unwrap();
        let names: Vec<String> = model
            .initial_guess(ScanRange::new(0.0, 1.0))
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["x0", "prefactor", "sigma", "offset"]);
        assert_eq!(model.center_params(), ["x0"]);
        assert!(CompositeModel::from_names("linear", &[] as &[&str]).unwrap().center_params().is_empty());
    }
}
