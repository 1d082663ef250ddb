use crate::rar::*;

/// Key under which the in-progress form is kept.
pub const DRAFT_KEY: &str = "byod-rar-form-draft";

/// Keeps at most one draft of the form, as a JSON file in the state directory.
pub struct DraftStore {
    directory: PathBuf,
}

impl DraftStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> DraftStore {
        DraftStore {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.json", DRAFT_KEY))
    }

    /// A draft that cannot be read back is ignored.
    pub fn load(&self) -> RarResult<Option<Draft>> {
        let path = self.path();
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).context(DraftIoSnafu {
            path: path.display().to_string(),
        })?;
        match serde_json::from_str::<Draft>(&contents) {
            Ok(d) => {
                debug!("load: draft at step {}", d.current_step);
                Ok(Some(d))
            }
            Err(e) => {
                warn!("load: ignoring unreadable draft {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, draft: &Draft) -> RarResult<()> {
        let path = self.path();
        fs::create_dir_all(&self.directory).context(DraftIoSnafu {
            path: self.directory.display().to_string(),
        })?;
        let contents = serde_json::to_string_pretty(draft).context(ParsingJsonSnafu {})?;
        fs::write(&path, contents).context(DraftIoSnafu {
            path: path.display().to_string(),
        })?;
        info!("save: draft saved to {:?}", path);
        Ok(())
    }

    pub fn clear(&self) -> RarResult<()> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(DraftIoSnafu {
                path: path.display().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rar_form::builder::FormBuilder;
    use tempfile::TempDir;

    #[test]
    fn save_load_clear() {
        let dir = TempDir::new().expect("tempdir");
        let store = DraftStore::new(dir.path().join("state"));
        assert_eq!(store.load().expect("load"), None);

        let state = FormBuilder::new()
            .answer("Full_Name", "Ada Lovelace")
            .and_then(|b| b.answer("Acknowledge_Security_Risks", "on"))
            .expect("known fields")
            .token("tok")
            .build();
        store.save(&state.draft()).expect("save");
        let restored = FormState::from_draft(&store.load().expect("load").expect("a draft"));
        assert_eq!(restored.value(Field::FullName), state.value(Field::FullName));
        assert_eq!(restored.recaptcha_token(), None);
        assert_eq!(
            restored.value(Field::AcknowledgeSecurityRisks),
            Some(&FieldValue::Flag(false))
        );

        store.clear().expect("clear");
        store.clear().expect("clear twice");
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn saved_under_the_fixed_key() {
        let store = DraftStore::new("/tmp/state");
        assert!(store.path().ends_with("byod-rar-form-draft.json"));
    }

    #[test]
    fn corrupt_draft_is_ignored() {
        let dir = TempDir::new().expect("tempdir");
        let store = DraftStore::new(dir.path());
        fs::write(store.path(), "{\"currentStep\": \"two\"}").expect("write");
        assert_eq!(store.load().expect("load"), None);
    }
}
