//! Declarative positional selectors over a command's argument vector.
//!
//! The catalog attaches one extractor per command to project key arguments
//! (and sometimes auxiliary arguments such as the `seconds` of EXPIRE) out of
//! the argv without per-command code.

use crate::args::Arg;

#[derive(Debug, Clone, Copy)]
pub enum ArgsExtractor {
    /// The arguments at the given indices.
    AtIndices(&'static [usize]),
    /// All arguments from `from` to the end, skipping `skip` arguments after
    /// each selected one.
    FromIndex { from: usize, skip: usize },
    /// Arguments in `[from, until)` with the same skip behaviour. `until == 0`
    /// means the full length, a negative `until` is relative to the length,
    /// and a positive `until` is clamped to one short of the end (the final
    /// argv slot of several commands is a non-key argument, e.g. the timeout
    /// of a blocking pop).
    FromUntilIndex {
        from: usize,
        until: isize,
        skip: usize,
    },
}

impl ArgsExtractor {
    pub const fn at(indices: &'static [usize]) -> Self {
        ArgsExtractor::AtIndices(indices)
    }

    pub const fn from_index(from: usize) -> Self {
        ArgsExtractor::FromIndex { from, skip: 0 }
    }

    pub const fn from_index_skipping(from: usize, skip: usize) -> Self {
        ArgsExtractor::FromIndex { from, skip }
    }

    pub const fn from_until(from: usize, until: isize) -> Self {
        ArgsExtractor::FromUntilIndex {
            from,
            until,
            skip: 0,
        }
    }

    /// Appends the selected arguments to `out`. Indices past the end of
    /// `args` select nothing.
    pub fn append<'a>(&self, out: &mut Vec<&'a Arg>, args: &'a [Arg]) {
        match *self {
            ArgsExtractor::AtIndices(indices) => {
                out.extend(indices.iter().filter_map(|&i| args.get(i)));
            }
            ArgsExtractor::FromIndex { from, skip } => {
                append_range(out, args, from, 0, skip);
            }
            ArgsExtractor::FromUntilIndex { from, until, skip } => {
                append_range(out, args, from, until, skip);
            }
        }
    }

    pub fn extract<'a>(&self, args: &'a [Arg]) -> Vec<&'a Arg> {
        let mut out = Vec::new();
        self.append(&mut out, args);
        out
    }
}

fn append_range<'a>(out: &mut Vec<&'a Arg>, args: &'a [Arg], from: usize, until: isize, skip: usize) {
    let len = args.len() as isize;
    let until_index = if until <= 0 {
        len + until
    } else if until >= len {
        len - 1
    } else {
        until
    };
    let until_index = until_index.max(0) as usize;

    let mut index = from;
    while index < until_index {
        out.push(&args[index]);
        index += 1 + skip;
    }
}
