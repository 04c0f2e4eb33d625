//!
//! Argument Bundles
//!
//! The positional values and keyword values of one call, supplied together.
//! The bundle owns a reference to every argument for the duration of the
//! call; decoding only borrows from it.
//!

use membrane_core::{Borrowed, Held, KindId, NativeResult, Owned, ValueType};

#[derive(Debug, Default)]
pub struct ArgBundle {
    positional: Vec<Owned>,
    keywords: Vec<(String, Owned)>,
}

impl ArgBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(items: Vec<Owned>) -> Self {
        Self {
            positional: items,
            keywords: Vec::new(),
        }
    }

    pub fn push(&mut self, value: Owned) {
        self.positional.push(value);
    }

    pub fn push_keyword(&mut self, name: impl Into<String>, value: Owned) {
        self.keywords.push((name.into(), value));
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: Owned) -> Self {
        self.push_keyword(name, value);
        self
    }

    /// Build a bundle from a runtime tuple of positionals and an optional
    /// dict of keywords. Keyword names must be strings.
    pub fn from_objects<'a>(
        held: &Held<'_>,
        args: impl Into<Borrowed<'a>>,
        kwargs: Option<Borrowed<'_>>,
    ) -> NativeResult<Self> {
        let mut bundle = Self::positional(held.extract::<Vec<Owned>>(held_tuple(held, args.into())?)?);

        if let Some(kwargs) = kwargs {
            if kwargs.value_type() != ValueType::Dict {
                return Err(held.expected("dict of keyword arguments", kwargs));
            }
            let mut position = 0;
            while let Some((key, value)) = held.dict_next(kwargs, &mut position)? {
                if key.value_type() != ValueType::Str {
                    return Err(held.raise_simple(KindId::TYPE_ERROR, "keywords must be strings"));
                }
                let name = held.extract::<String>(key)?;
                bundle.push_keyword(name, value.into_owned());
            }
        }
        Ok(bundle)
    }

    pub fn args(&self) -> &[Owned] {
        &self.positional
    }

    pub fn kwargs(&self) -> &[(String, Owned)] {
        &self.keywords
    }

    pub fn has_keywords(&self) -> bool {
        !self.keywords.is_empty()
    }

    /// Total number of arguments supplied
    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn held_tuple<'a>(held: &Held<'_>, args: Borrowed<'a>) -> NativeResult<Borrowed<'a>> {
    match args.value_type() {
        ValueType::Tuple => Ok(args),
        _ => Err(held.expected("tuple of positional arguments", args)),
    }
}
