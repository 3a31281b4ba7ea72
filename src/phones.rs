use crate::error::{DecodeError, DecodeResult};
use crate::tmat::TransitionModel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A context-independent phone: its transition matrix and the senone scored
/// by each emitting state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phone {
    pub name: String,
    pub tmat: usize,
    pub senones: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PhoneSet {
    pub phones: Vec<Phone>,
}

impl PhoneSet {
    /// One matrix per phone and consecutive senone ids, the usual layout of a
    /// context-independent model.
    pub fn context_independent<S: AsRef<str>>(names: &[S], n_emit_state: usize) -> Self {
        let phones = names
            .iter()
            .enumerate()
            .map(|(i, name)| Phone {
                name: name.as_ref().to_string(),
                tmat: i,
                senones: (0..n_emit_state)
                    .map(|j| (i * n_emit_state + j) as u16)
                    .collect(),
            })
            .collect();
        Self { phones }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> DecodeResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn len(&self) -> usize {
        self.phones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phones.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.phones.iter().position(|p| p.name == name)
    }

    /// Highest senone id referenced by any phone.
    pub fn max_senone(&self) -> Option<u16> {
        self.phones.iter().flat_map(|p| p.senones.iter().copied()).max()
    }

    /// Checks every phone against the transition model and senone count.
    pub fn validate(&self, tmat: &TransitionModel, n_senones: usize) -> DecodeResult<()> {
        if self.phones.is_empty() {
            return Err(DecodeError::Config("phone set is empty".into()));
        }
        for p in &self.phones {
            if p.tmat >= tmat.n_tmat() {
                return Err(DecodeError::Dimension(format!(
                    "phone '{}' uses tmat {} but only {} are loaded",
                    p.name,
                    p.tmat,
                    tmat.n_tmat()
                )));
            }
            if p.senones.len() != tmat.n_state() {
                return Err(DecodeError::Dimension(format!(
                    "phone '{}' has {} senones for a {}-state topology",
                    p.name,
                    p.senones.len(),
                    tmat.n_state()
                )));
            }
            if let Some(&s) = p.senones.iter().find(|&&s| s as usize >= n_senones) {
                return Err(DecodeError::Dimension(format!(
                    "phone '{}' references senone {} of {}",
                    p.name, s, n_senones
                )));
            }
        }
        Ok(())
    }
}
