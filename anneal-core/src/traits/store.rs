//! Recipe persistence

use core::future::Future;

use crate::config::{DeviceLimits, Recipe, RecipeError};

/// Somewhere a recipe can be kept between power cycles
pub trait RecipeStore {
    /// Storage backend error
    type Error;

    /// Load the stored recipe, `None` if nothing was saved yet
    ///
    /// The returned recipe has not been checked against device limits;
    /// use [`load_validated`].
    fn load(&mut self) -> impl Future<Output = Result<Option<Recipe>, Self::Error>>;

    /// Replace the stored recipe
    fn save(&mut self, recipe: &Recipe) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Errors from [`load_validated`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError<E> {
    /// Backend failed
    Backend(E),
    /// Stored recipe no longer fits the configured limits
    Invalid(RecipeError),
}

/// Load a recipe and reject it if any stage is out of range
pub async fn load_validated<S: RecipeStore>(
    store: &mut S,
    limits: &DeviceLimits,
) -> Result<Option<Recipe>, StoreError<S::Error>> {
    let Some(recipe) = store.load().await.map_err(StoreError::Backend)? else {
        return Ok(None);
    };
    recipe.validate(limits).map_err(StoreError::Invalid)?;
    Ok(Some(recipe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Stage;
    use anneal_protocol::FlowRange;
    use embassy_futures::block_on;

    struct MemoryStore {
        recipe: Option<Recipe>,
        broken: bool,
    }

    impl RecipeStore for MemoryStore {
        type Error = ();

        async fn load(&mut self) -> Result<Option<Recipe>, ()> {
            if self.broken {
                return Err(());
            }
            Ok(self.recipe.clone())
        }

        async fn save(&mut self, recipe: &Recipe) -> Result<(), ()> {
            self.recipe = Some(recipe.clone());
            Ok(())
        }
    }

    fn limits(max_c: i16) -> DeviceLimits {
        DeviceLimits {
            ambient_x10: 250,
            furnace_max_x10: max_c * 10,
            flow_range: FlowRange::SCCM_500,
        }
    }

    fn recipe() -> Recipe {
        let stage = Stage {
            target_x10: 8000,
            ramp_s: 600,
            hold_s: 600,
            flow_sccm: 50.0,
        };
        Recipe::from_stages(&[stage], &limits(1200)).unwrap()
    }

    #[test]
    fn test_save_then_load() {
        let mut store = MemoryStore {
            recipe: None,
            broken: false,
        };
        assert_eq!(block_on(load_validated(&mut store, &limits(1200))), Ok(None));

        block_on(store.save(&recipe())).unwrap();
        let loaded = block_on(load_validated(&mut store, &limits(1200))).unwrap();
        assert_eq!(loaded, Some(recipe()));
    }

    #[test]
    fn test_stored_recipe_revalidated() {
        let mut store = MemoryStore {
            recipe: Some(recipe()),
            broken: false,
        };
        // Furnace limit lowered since the recipe was saved
        let result = block_on(load_validated(&mut store, &limits(700)));
        assert!(matches!(result, Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_backend_error() {
        let mut store = MemoryStore {
            recipe: None,
            broken: true,
        };
        assert_eq!(
            block_on(load_validated(&mut store, &limits(1200))),
            Err(StoreError::Backend(()))
        );
    }
}
