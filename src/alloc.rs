//! Reference and slug allocation.
//!
//! References are human-facing codes, unique and monotonically increasing
//! within a (project, entity kind) scope. Allocation reserves the next value
//! of an atomic per-scope counter inside an IMMEDIATE transaction, so two
//! concurrent allocations can never observe the same sequence value; the
//! original timestamp-polling scheme is gone but its contract holds: returned
//! references are unique, never reused, and every call terminates.
//!
//! Slugs are lowercase hyphenated tokens unique across a whole namespace
//! (projects, documents, questions each have their own). Collisions append
//! `-1`, `-2`, … until a free token is found, bounded by the configured retry
//! budget. The suffix scan is a plain read, so entity creation goes through
//! [`ReferenceAllocator::insert_with_slug`], which retries the scan when the
//! insert loses a race on the namespace's UNIQUE constraint.

use std::time::Duration;

use crate::config::CoreConfig;
use crate::models::{RefKind, SlugNamespace};
use crate::storage::Storage;
use crate::{Error, Result};

/// Alphabet for reference encoding, matching Django's base62 converter.
const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Token used when a name normalizes to nothing.
pub const SLUG_FALLBACK: &str = "null";

/// Pause between reference retries after a collision.
const RETRY_BACKOFF: Duration = Duration::from_millis(2);

/// Encode a sequence value in base62.
pub fn base62_encode(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE62_ALPHABET[(n % 62) as usize]);
        n /= 62;
    }
    digits.reverse();
    // alphabet bytes are ASCII
    String::from_utf8_lossy(&digits).into_owned()
}

/// Normalize a display name into a slug token: lowercase alphanumeric runs
/// joined by single hyphens. Unicode letters are kept, not ASCII-folded.
/// May be empty.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }

    slug
}

/// Allocator for references and slugs against the persisted store.
pub struct ReferenceAllocator {
    max_retries: u32,
}

impl ReferenceAllocator {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            max_retries: config.max_alloc_retries,
        }
    }

    /// Allocate the next reference for a (project, kind) scope.
    ///
    /// The counter only moves forward, so a candidate collision can only
    /// happen when refs were written out-of-band (e.g. an import); in that
    /// case the candidate is skipped after a short backoff and the counter
    /// catches up. Exhausting the retry budget is an `AllocationExhausted`
    /// error, fatal to the single create operation.
    pub fn allocate_ref(
        &self,
        store: &mut Storage,
        project_id: i64,
        kind: RefKind,
    ) -> Result<String> {
        for attempt in 0..self.max_retries {
            let seq = store.reserve_ref_seq(project_id, kind)?;
            let candidate = base62_encode(seq);

            if !store.ref_exists(project_id, kind, &candidate)? {
                tracing::debug!(%kind, project_id, %candidate, "allocated reference");
                return Ok(candidate);
            }

            tracing::warn!(
                %kind,
                project_id,
                %candidate,
                attempt,
                "reference candidate already taken, retrying"
            );
            std::thread::sleep(RETRY_BACKOFF);
        }

        Err(Error::AllocationExhausted {
            scope: format!("{} refs of project {}", kind, project_id),
            attempts: self.max_retries,
        })
    }

    /// Find a currently free slug for a name within a namespace.
    ///
    /// An empty normalization falls back to `"null"`; collisions walk the
    /// `-1`, `-2`, … suffix chain. The scan gives no protection against a
    /// concurrent writer claiming the token before it is persisted; creation
    /// paths go through [`insert_with_slug`](Self::insert_with_slug) instead.
    pub fn allocate_slug(
        &self,
        store: &Storage,
        namespace: SlugNamespace,
        name: &str,
    ) -> Result<String> {
        let mut base = slugify(name);
        if base.is_empty() {
            base = SLUG_FALLBACK.to_string();
        }

        for suffix in 0..=self.max_retries {
            let candidate = if suffix == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, suffix)
            };

            if !store.slug_exists(namespace, &candidate)? {
                tracing::debug!(%namespace, %candidate, "allocated slug");
                return Ok(candidate);
            }
        }

        Err(Error::AllocationExhausted {
            scope: format!("{} slug '{}'", namespace, base),
            attempts: self.max_retries,
        })
    }

    /// Allocate a slug and run the caller's insert with it, re-running the
    /// suffix scan when the insert hits the namespace's UNIQUE constraint.
    ///
    /// Two allocators racing on the same name can both be handed the same
    /// token by [`allocate_slug`](Self::allocate_slug); the loser's
    /// constraint violation lands here and triggers a fresh scan after a
    /// short backoff instead of surfacing as a database error. Exhausting
    /// the retry budget is an `AllocationExhausted` error, fatal to the
    /// single create operation.
    pub fn insert_with_slug<T, F>(
        &self,
        store: &mut Storage,
        namespace: SlugNamespace,
        name: &str,
        mut insert: F,
    ) -> Result<T>
    where
        F: FnMut(&mut Storage, String) -> Result<T>,
    {
        for attempt in 0..=self.max_retries {
            let candidate = self.allocate_slug(store, namespace, name)?;

            match insert(store, candidate) {
                Ok(created) => return Ok(created),
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!(
                        %namespace,
                        attempt,
                        "slug taken by a concurrent writer, retrying"
                    );
                    std::thread::sleep(RETRY_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::AllocationExhausted {
            scope: format!("{} slug for '{}'", namespace, name),
            attempts: self.max_retries,
        })
    }
}

/// Whether an error is a SQLite UNIQUE/PRIMARY KEY constraint failure.
fn is_unique_violation(e: &Error) -> bool {
    matches!(
        e,
        Error::Database(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
