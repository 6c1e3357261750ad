//! Object key layout.

use facetag_models::{FaceId, ObjectId};

/// Extension appended to every face crop key.
pub const FACE_EXTENSION: &str = ".jpg";

/// Where images and faces live inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    pub images_prefix: String,
    pub faces_prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            images_prefix: "images/".to_string(),
            faces_prefix: "faces/".to_string(),
        }
    }
}

impl KeyLayout {
    pub fn image_key(&self, id: &ObjectId) -> String {
        format!("{}{}", self.images_prefix, id.as_str())
    }

    pub fn face_key(&self, id: &FaceId) -> String {
        format!("{}{}{}", self.faces_prefix, id.as_str(), FACE_EXTENSION)
    }

    /// Key for a face reference as it appears in a URL.
    ///
    /// Accepts both the bare FaceID and the `<FaceID>.jpg` file name.
    pub fn face_key_for_ref(&self, face_ref: &str) -> String {
        let id = face_ref.strip_suffix(FACE_EXTENSION).unwrap_or(face_ref);
        format!("{}{}{}", self.faces_prefix, id, FACE_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = KeyLayout::default();
        assert_eq!(layout.image_key(&ObjectId::new("img1.jpg")), "images/img1.jpg");
        assert_eq!(
            layout.face_key(&FaceId::from_string("abc")),
            "faces/abc.jpg"
        );
    }

    #[test]
    fn test_face_ref_with_or_without_extension() {
        let layout = KeyLayout::default();
        assert_eq!(layout.face_key_for_ref("abc"), "faces/abc.jpg");
        assert_eq!(layout.face_key_for_ref("abc.jpg"), "faces/abc.jpg");
    }

    #[test]
    fn test_empty_prefixes() {
        let layout = KeyLayout {
            images_prefix: String::new(),
            faces_prefix: String::new(),
        };
        assert_eq!(layout.image_key(&ObjectId::new("x")), "x");
        assert_eq!(layout.face_key(&FaceId::from_string("f")), "f.jpg");
    }
}
