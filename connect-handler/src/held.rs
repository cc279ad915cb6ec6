// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Owned or externally supplied handler resources.

use std::cell::{Ref, RefCell, RefMut};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// A resource either owned by the handler or supplied by the connection
/// that drives it.
///
/// Dropping an `Owned` value frees the resource. Dropping a `Borrowed`
/// value only releases the handler's reference; the external owner
/// keeps the resource alive.
#[derive(Debug)]
pub enum Held<T> {
    Owned(Box<T>),
    Borrowed(Rc<RefCell<T>>),
}

impl<T: Default> Default for Held<T> {
    fn default() -> Self {
        Held::Owned(Box::default())
    }
}

impl<T> Held<T> {
    pub fn owned(value: T) -> Self {
        Held::Owned(Box::new(value))
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Held::Owned(_))
    }

    /// Replaces the resource with an external one. An owned resource
    /// is dropped here.
    pub fn borrow_from(&mut self, external: Rc<RefCell<T>>) {
        *self = Held::Borrowed(external);
    }

    pub fn get(&self) -> HeldRef<'_, T> {
        match self {
            Held::Owned(value) => HeldRef::Owned(value),
            Held::Borrowed(cell) => HeldRef::Borrowed(cell.borrow()),
        }
    }

    pub fn get_mut(&mut self) -> HeldMut<'_, T> {
        match self {
            Held::Owned(value) => HeldMut::Owned(value),
            Held::Borrowed(cell) => HeldMut::Borrowed(cell.borrow_mut()),
        }
    }
}

pub enum HeldRef<'a, T> {
    Owned(&'a T),
    Borrowed(Ref<'a, T>),
}

impl<T> Deref for HeldRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            HeldRef::Owned(value) => value,
            HeldRef::Borrowed(value) => value,
        }
    }
}

pub enum HeldMut<'a, T> {
    Owned(&'a mut T),
    Borrowed(RefMut<'a, T>),
}

impl<T> Deref for HeldMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            HeldMut::Owned(value) => value,
            HeldMut::Borrowed(value) => value,
        }
    }
}

impl<T> DerefMut for HeldMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self {
            HeldMut::Owned(value) => value,
            HeldMut::Borrowed(value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrowed_outlives_holder() {
        let external = Rc::new(RefCell::new(vec![1u8, 2, 3]));
        let mut held = Held::owned(vec![9u8]);
        assert!(held.is_owned());

        held.borrow_from(Rc::clone(&external));
        assert!(!held.is_owned());
        held.get_mut().push(4);
        assert_eq!(*held.get(), vec![1, 2, 3, 4]);
        assert_eq!(Rc::strong_count(&external), 2);

        drop(held);
        assert_eq!(Rc::strong_count(&external), 1);
        assert_eq!(*external.borrow(), vec![1, 2, 3, 4]);
    }
}
