//! Resource trait: anything an object-level authorization decision is made about.

use crate::SubjectId;

/// A concrete resource instance with an optional owner.
///
/// Ownership-scoped grants ("own") only ever apply when `owner_id` is present
/// and equal to the acting subject. A resource type without an owner returns
/// `None`, which leaves only the unscoped ("all") grants in play.
pub trait OwnedResource {
    fn owner_id(&self) -> Option<SubjectId>;
}

impl<T: OwnedResource + ?Sized> OwnedResource for &T {
    fn owner_id(&self) -> Option<SubjectId> {
        (**self).owner_id()
    }
}

impl<T: OwnedResource + ?Sized> OwnedResource for Box<T> {
    fn owner_id(&self) -> Option<SubjectId> {
        (**self).owner_id()
    }
}

/// A bare owner attribute, for callers that only know who owns a record.
impl OwnedResource for Option<SubjectId> {
    fn owner_id(&self) -> Option<SubjectId> {
        *self
    }
}

impl OwnedResource for SubjectId {
    fn owner_id(&self) -> Option<SubjectId> {
        Some(*self)
    }
}
