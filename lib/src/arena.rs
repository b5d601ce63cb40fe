//! Dense handle arena.
//!
//! Records are never removed, so a handle stays valid for the lifetime
//! of the arena and iteration order is insertion order.

use std::{
    marker::PhantomData,
    ops::{Index, IndexMut},
};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Arena<Id: IdLike + Copy, T> {
    inner: Vec<T>,
    #[serde(skip)]
    _phantom: PhantomData<Id>,
}

impl<Id: IdLike + Copy, T> Arena<Id, T> {
    pub fn new() -> Self {
        Self {
            inner: Vec::new(),
            _phantom: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn push(&mut self, x: T) -> Id {
        let id = Id::from_raw(self.inner.len());
        self.inner.push(x);
        id
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        self.inner.get(id.into_raw())
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.inner.get_mut(id.into_raw())
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> {
        (0..self.inner.len()).map(Id::from_raw)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &T)> {
        self.inner
            .iter()
            .enumerate()
            .map(|(i, v)| (Id::from_raw(i), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id, &mut T)> {
        self.inner
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (Id::from_raw(i), v))
    }
}

impl<Id: IdLike + Copy, T> Default for Arena<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: IdLike + Copy, T> Index<Id> for Arena<Id, T> {
    type Output = T;

    fn index(&self, index: Id) -> &Self::Output {
        &self.inner[index.into_raw()]
    }
}

impl<Id: IdLike + Copy, T> IndexMut<Id> for Arena<Id, T> {
    fn index_mut(&mut self, index: Id) -> &mut Self::Output {
        &mut self.inner[index.into_raw()]
    }
}

pub trait IdLike {
    fn from_raw(index: usize) -> Self;
    fn into_raw(self) -> usize;
}

#[cfg(test)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct TestId(usize);

#[cfg(test)]
impl IdLike for TestId {
    fn from_raw(index: usize) -> Self {
        Self(index)
    }

    fn into_raw(self) -> usize {
        self.0
    }
}

#[test]
fn handles_follow_insertion_order() {
    let mut arena: Arena<TestId, &str> = Arena::new();
    let sun = arena.push("Sun");
    let earth = arena.push("Earth");
    assert_eq!(sun, TestId(0));
    assert_eq!(earth, TestId(1));
    assert_eq!(arena[earth], "Earth");
    assert_eq!(
        arena.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
        ["Sun", "Earth"]
    );
    assert!(arena.get(TestId(2)).is_none());
}
