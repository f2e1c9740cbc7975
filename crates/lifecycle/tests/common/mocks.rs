use async_trait::async_trait;
use bytes::Bytes;
use casa_records::{
    FieldValue, MemoryRecordStore, OwningRecord, RecordError, RecordResult, RecordStore,
    ReferenceField,
};
use casa_storage::{ListOptions, ObjectEntry, ObjectStore, SignedUrl, StorageError, StorageResult};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

/// In-memory object store with scripted failures and call counters.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedStore {
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
    /// Outcome of each successive `remove` call; `None` succeeds. Empty queue succeeds.
    remove_script: Mutex<VecDeque<Option<String>>>,
    /// Any `remove` touching this key fails with the message.
    reject_remove_of: Mutex<Option<(String, String)>>,
    list_failure: Mutex<Option<String>>,
    upload_failure: Mutex<Option<String>>,
    pub remove_batches: Mutex<Vec<Vec<String>>>,
    pub list_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: &str) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            (Bytes::from_static(b"seed"), "image/jpeg".to_string()),
        );
    }

    pub fn seed_many(&self, keys: impl IntoIterator<Item = String>) {
        for key in keys {
            self.seed(&key);
        }
    }

    pub fn script_removes(&self, outcomes: impl IntoIterator<Item = Option<&'static str>>) {
        let mut script = self.remove_script.lock().unwrap();
        script.extend(outcomes.into_iter().map(|o| o.map(str::to_string)));
    }

    pub fn reject_remove_of(&self, key: &str, message: &str) {
        *self.reject_remove_of.lock().unwrap() = Some((key.to_string(), message.to_string()));
    }

    pub fn fail_lists(&self, message: &str) {
        *self.list_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_uploads(&self, message: &str) {
        *self.upload_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn remove_call_count(&self) -> usize {
        self.remove_batches.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn list(&self, prefix: &str, options: ListOptions) -> StorageResult<Vec<ObjectEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.list_failure.lock().unwrap().clone() {
            return Err(StorageError::Provider(message));
        }
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter_map(|(key, (data, _))| {
                let name = key.strip_prefix(prefix)?;
                options.admits(name).then(|| ObjectEntry {
                    name: name.to_string(),
                    key: key.clone(),
                    size: data.len() as u64,
                })
            })
            .take(options.limit)
            .collect())
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.upload_failure.lock().unwrap().clone() {
            return Err(StorageError::Provider(message));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        self.remove_batches.lock().unwrap().push(keys.to_vec());

        if let Some((rejected, message)) = self.reject_remove_of.lock().unwrap().clone()
            && keys.contains(&rejected)
        {
            return Err(StorageError::Provider(message));
        }
        if let Some(Some(message)) = self.remove_script.lock().unwrap().pop_front() {
            return Err(StorageError::Provider(message));
        }

        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.contains(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl> {
        if !self.contains(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(SignedUrl {
            url: format!("https://cdn.test/{key}?token=signed"),
            expires_at: OffsetDateTime::now_utc() + ttl,
        })
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// Record store that fails or races selected writes.
#[allow(dead_code)]
#[derive(Default)]
pub struct FlakyRecordStore {
    pub inner: MemoryRecordStore,
    fail_field: Mutex<Option<ReferenceField>>,
    /// Bump the record's version just before the next primary write lands.
    race_next_primary_write: Mutex<bool>,
    pub writes: Mutex<Vec<(String, ReferenceField, Vec<String>)>>,
}

#[allow(dead_code)]
impl FlakyRecordStore {
    pub async fn with_records(records: impl IntoIterator<Item = OwningRecord>) -> Self {
        Self {
            inner: MemoryRecordStore::with_records(records).await.unwrap(),
            ..Self::default()
        }
    }

    pub fn fail_writes_to(&self, field: ReferenceField) {
        *self.fail_field.lock().unwrap() = Some(field);
    }

    pub fn race_next_primary_write(&self) {
        *self.race_next_primary_write.lock().unwrap() = true;
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for FlakyRecordStore {
    async fn get_record(&self, id: &str) -> RecordResult<Option<OwningRecord>> {
        self.inner.get_record(id).await
    }

    async fn read_reference_field(
        &self,
        id: &str,
        field: ReferenceField,
    ) -> RecordResult<FieldValue> {
        self.inner.read_reference_field(id, field).await
    }

    async fn write_reference_field(
        &self,
        id: &str,
        field: ReferenceField,
        references: &[String],
        expected_previous_modified_at: Option<OffsetDateTime>,
    ) -> RecordResult<OffsetDateTime> {
        if *self.fail_field.lock().unwrap() == Some(field) {
            return Err(RecordError::Timeout(format!("{} write stalled", field.as_str())));
        }

        let race = field == ReferenceField::Primary
            && std::mem::take(&mut *self.race_next_primary_write.lock().unwrap());
        if race {
            // Another writer updates the record first.
            let current = self.inner.get_record(id).await?.map(|r| r.primary).unwrap_or_default();
            self.inner
                .write_reference_field(id, ReferenceField::Primary, &current, None)
                .await?;
        }

        let modified_at = self
            .inner
            .write_reference_field(id, field, references, expected_previous_modified_at)
            .await?;
        self.writes
            .lock()
            .unwrap()
            .push((id.to_string(), field, references.to_vec()));
        Ok(modified_at)
    }

    async fn list_records_with_references(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> RecordResult<Vec<OwningRecord>> {
        self.inner.list_records_with_references(after, limit).await
    }

    async fn insert_record(&self, record: &OwningRecord) -> RecordResult<()> {
        self.inner.insert_record(record).await
    }

    async fn health_check(&self) -> RecordResult<()> {
        Ok(())
    }
}
