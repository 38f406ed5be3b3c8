//! Recipe persistence
//!
//! Keeps the last saved recipe in flash, postcard-encoded.

use defmt::*;

use anneal_core::config::{Recipe, MAX_STAGES};
use anneal_core::traits::RecipeStore;
use anneal_hal_rp2040::flash::{FlashError, FlashStorage, StorageKey};
use anneal_hal_rp2040::FlashStorageTrait;

/// Upper bound of an encoded recipe: length prefix plus stages of at most
/// 3 + 5 + 5 + 4 bytes each
const MAX_RECIPE_SIZE: usize = 1 + MAX_STAGES * 17;

/// Recipe persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecipeStoreError {
    /// Flash operation failed
    Flash(FlashError),
    /// Serialization failed
    Serialize,
    /// Deserialization failed
    Deserialize,
}

impl From<FlashError> for RecipeStoreError {
    fn from(e: FlashError) -> Self {
        RecipeStoreError::Flash(e)
    }
}

/// Recipe store on the RP2040 storage partition
pub struct FlashRecipeStore<'d> {
    storage: FlashStorage<'d>,
}

impl<'d> FlashRecipeStore<'d> {
    pub fn new(storage: FlashStorage<'d>) -> Self {
        Self { storage }
    }
}

impl<'d> RecipeStore for FlashRecipeStore<'d> {
    type Error = RecipeStoreError;

    async fn load(&mut self) -> Result<Option<Recipe>, RecipeStoreError> {
        let mut buffer = [0u8; MAX_RECIPE_SIZE];
        let len = match self.storage.read(StorageKey::Recipe, &mut buffer).await {
            Ok(len) => len,
            Err(FlashError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        debug!("Read {} bytes of recipe from flash", len);

        let recipe: Recipe =
            postcard::from_bytes(&buffer[..len]).map_err(|_| RecipeStoreError::Deserialize)?;
        Ok(Some(recipe))
    }

    async fn save(&mut self, recipe: &Recipe) -> Result<(), RecipeStoreError> {
        let mut buffer = [0u8; MAX_RECIPE_SIZE];
        let bytes =
            postcard::to_slice(recipe, &mut buffer).map_err(|_| RecipeStoreError::Serialize)?;

        self.storage.write(StorageKey::Recipe, bytes).await?;
        info!("Saved {} stage recipe ({} bytes)", recipe.len(), bytes.len());
        Ok(())
    }
}
