//! Image record.
//!
//! `name` and `image_path` are derived at insert time by the image
//! repository; callers only supply the owning `process_detail_id`, which the
//! repository checks against the store.

use super::{EntityId, UNSAVED_ID};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: EntityId,
    /// Derived file name, `{image_guid}_{timestamp}.jpg`.
    pub name: String,
    /// `None` means not materialized yet, deleted, or the save failed.
    pub image_path: Option<String>,
    pub image_guid: Uuid,
    pub process_detail_id: EntityId,
    pub row_version: i64,
    pub updated_at: i64,
}

impl Image {
    /// Creates an unsaved image placeholder for one process detail.
    pub fn new(process_detail_id: EntityId) -> Self {
        Self {
            id: UNSAVED_ID,
            name: String::new(),
            image_path: None,
            image_guid: Uuid::nil(),
            process_detail_id,
            row_version: 0,
            updated_at: 0,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != UNSAVED_ID
    }

    pub fn is_materialized(&self) -> bool {
        self.image_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::Image;

    #[test]
    fn new_image_is_unsaved_and_unmaterialized() {
        let image = Image::new(3);
        assert!(!image.is_persisted());
        assert!(!image.is_materialized());
        assert!(image.image_guid.is_nil());
        assert_eq!(image.process_detail_id, 3);
    }
}
