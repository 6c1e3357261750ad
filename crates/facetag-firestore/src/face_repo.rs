//! Face repository over the `names` and `relations` collections.
//!
//! Both collections are keyed by FaceID:
//! - `names/{FaceID}`: `FaceID`, `FaceName` (null until labeled), `CreatedAt`
//! - `relations/{FaceID}`: `ImageID`, `FaceID`

use std::collections::HashMap;

use facetag_models::{FaceId, FaceRecord, ObjectId, Relation};
use tracing::debug;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, Filter, Order, StructuredQuery, ToFirestoreValue, Value, Write};

pub const NAMES_COLLECTION: &str = "names";
pub const RELATIONS_COLLECTION: &str = "relations";

const FIELD_FACE_ID: &str = "FaceID";
const FIELD_FACE_NAME: &str = "FaceName";
const FIELD_CREATED_AT: &str = "CreatedAt";
const FIELD_IMAGE_ID: &str = "ImageID";

/// Firestore caps the number of values in an `IN` filter.
const IN_FILTER_LIMIT: usize = 30;

/// Repository for face rows and their image relations.
#[derive(Clone)]
pub struct FaceRepository {
    client: FirestoreClient,
}

impl FaceRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Insert a face row and its relation in one atomic commit.
    pub async fn insert_face(&self, face: &FaceRecord, relation: &Relation) -> FirestoreResult<()> {
        let face_doc = Document::named(
            self.client
                .full_document_name(NAMES_COLLECTION, face.face_id.as_str()),
            face_fields(face),
        );
        let relation_doc = Document::named(
            self.client
                .full_document_name(RELATIONS_COLLECTION, relation.face_id.as_str()),
            relation_fields(relation),
        );

        self.client
            .commit(vec![Write::create(face_doc), Write::create(relation_doc)])
            .await?;

        debug!(face_id = %face.face_id, image_id = %relation.image_id, "Inserted face");
        Ok(())
    }

    /// Oldest face that has no name yet.
    pub async fn next_unlabeled(&self) -> FirestoreResult<Option<FaceId>> {
        let query = StructuredQuery::collection(NAMES_COLLECTION)
            .filter(Filter::is_null(FIELD_FACE_NAME))
            .order_by(vec![
                Order::ascending(FIELD_CREATED_AT),
                Order::ascending(FIELD_FACE_ID),
            ])
            .limit(1);

        let docs = self.client.run_query(query).await?;
        docs.first().map(face_id_of).transpose()
    }

    /// Set the name of an existing face.
    ///
    /// Returns [`FirestoreError::NotFound`] when no such face exists; no row is created.
    pub async fn assign_name(&self, face_id: &FaceId, name: &str) -> FirestoreResult<()> {
        // No face can be stored under an id Firestore rejects.
        if !FirestoreClient::is_valid_document_id(face_id.as_str()) {
            return Err(FirestoreError::not_found(format!(
                "{}/{}",
                NAMES_COLLECTION, face_id
            )));
        }

        let fields = HashMap::from([(FIELD_FACE_NAME.to_string(), name.to_firestore_value())]);
        self.client
            .update_existing_document(NAMES_COLLECTION, face_id.as_str(), fields, &[FIELD_FACE_NAME])
            .await?;
        Ok(())
    }

    /// Images related to any face carrying exactly `name`.
    pub async fn find_images_by_name(&self, name: &str) -> FirestoreResult<Vec<ObjectId>> {
        let query = StructuredQuery::collection(NAMES_COLLECTION)
            .filter(Filter::field(FIELD_FACE_NAME, "EQUAL", name.to_firestore_value()));

        let face_ids = self
            .client
            .run_query(query)
            .await?
            .iter()
            .map(face_id_of)
            .collect::<FirestoreResult<Vec<_>>>()?;

        let mut images = Vec::new();
        for chunk in face_ids.chunks(IN_FILTER_LIMIT) {
            let ids: Vec<String> = chunk.iter().map(|id| id.as_str().to_string()).collect();
            let query = StructuredQuery::collection(RELATIONS_COLLECTION)
                .filter(Filter::field(FIELD_FACE_ID, "IN", ids.to_firestore_value()));

            for doc in self.client.run_query(query).await? {
                let image_id: String = doc.get(FIELD_IMAGE_ID).ok_or_else(|| {
                    FirestoreError::invalid_document(format!(
                        "relation {:?} has no {}",
                        doc.name, FIELD_IMAGE_ID
                    ))
                })?;
                images.push(ObjectId::new(image_id));
            }
        }

        debug!(faces = face_ids.len(), images = images.len(), "Resolved images by name");
        Ok(images)
    }
}

fn face_fields(face: &FaceRecord) -> HashMap<String, Value> {
    HashMap::from([
        (FIELD_FACE_ID.to_string(), face.face_id.as_str().to_firestore_value()),
        (FIELD_FACE_NAME.to_string(), face.face_name.to_firestore_value()),
        (FIELD_CREATED_AT.to_string(), face.created_at.to_firestore_value()),
    ])
}

fn relation_fields(relation: &Relation) -> HashMap<String, Value> {
    HashMap::from([
        (FIELD_IMAGE_ID.to_string(), relation.image_id.as_str().to_firestore_value()),
        (FIELD_FACE_ID.to_string(), relation.face_id.as_str().to_firestore_value()),
    ])
}

fn face_id_of(doc: &Document) -> FirestoreResult<FaceId> {
    doc.get::<String>(FIELD_FACE_ID)
        .or_else(|| doc.id().map(str::to_string))
        .map(FaceId::from_string)
        .ok_or_else(|| FirestoreError::invalid_document("face document without FaceID"))
}
