//! Turn scheduling for the commons environment.
//!
//! The `TurnCycler` walks a fixed, ordered list of tokens (agent ids or
//! phases) in a cycle. The environment keeps two of them: one over agents,
//! advanced on every accepted step, and one over phases, advanced whenever the
//! last agent of a phase has acted.

// ---------------------------------------------------------------------------
// TurnCycler
// ---------------------------------------------------------------------------

/// Cyclic cursor over an ordered, non-empty token list.
///
/// A freshly built cycler has no current token; the first call to
/// [`TurnCycler::next`] selects the first token. After the last token the
/// cursor wraps back to the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnCycler<T> {
    tokens: Vec<T>,
    cursor: Option<usize>,
}

impl<T> TurnCycler<T> {
    /// Build a cycler over `tokens`. Returns `None` for an empty list.
    pub fn new(tokens: Vec<T>) -> Option<Self> {
        if tokens.is_empty() {
            return None;
        }
        Some(Self {
            tokens,
            cursor: None,
        })
    }

    /// Advance the cursor and return the newly selected token.
    pub fn next(&mut self) -> &T {
        let index = match self.cursor {
            Some(index) => (index + 1) % self.tokens.len(),
            None => 0,
        };
        self.cursor = Some(index);
        &self.tokens[index]
    }

    /// Rewind to the first token and return it.
    pub fn reset(&mut self) -> &T {
        self.cursor = Some(0);
        &self.tokens[0]
    }

    /// Replace the cycle (e.g. with a freshly permuted agent order).
    ///
    /// The cursor is cleared, so the following [`TurnCycler::next`] selects
    /// the first token of the new order. An empty list keeps the current cycle.
    pub fn reinit(&mut self, tokens: Vec<T>) {
        if tokens.is_empty() {
            return;
        }
        self.tokens = tokens;
        self.cursor = None;
    }

    /// Currently selected token, if [`TurnCycler::next`] or [`TurnCycler::reset`] ran.
    pub fn current(&self) -> Option<&T> {
        self.cursor.map(|index| &self.tokens[index])
    }

    /// Whether the selected token is the first of the cycle.
    pub fn is_first(&self) -> bool {
        self.cursor == Some(0)
    }

    /// Whether the selected token is the last of the cycle.
    pub fn is_last(&self) -> bool {
        self.cursor == Some(self.tokens.len() - 1)
    }

    pub fn tokens(&self) -> &[T] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents() -> TurnCycler<&'static str> {
        TurnCycler::new(vec!["a", "b", "c"]).expect("non-empty")
    }

    #[test]
    fn empty_token_list_is_rejected() {
        assert!(TurnCycler::<u8>::new(Vec::new()).is_none());
    }

    #[test]
    fn next_walks_in_order_and_wraps() {
        let mut cycler = agents();
        assert_eq!(cycler.current(), None);
        let order = (0..7).map(|_| *cycler.next()).collect::<Vec<_>>();
        assert_eq!(order, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn first_and_last_track_the_cursor() {
        let mut cycler = agents();
        assert!(!cycler.is_first());
        assert!(!cycler.is_last());

        cycler.next();
        assert!(cycler.is_first());
        cycler.next();
        assert!(!cycler.is_first() && !cycler.is_last());
        cycler.next();
        assert!(cycler.is_last());
        cycler.next();
        assert!(cycler.is_first());
    }

    #[test]
    fn reset_rewinds_to_first() {
        let mut cycler = agents();
        cycler.next();
        cycler.next();
        assert_eq!(*cycler.reset(), "a");
        assert!(cycler.is_first());
        assert_eq!(*cycler.next(), "b");
    }

    #[test]
    fn reinit_replaces_cycle_and_clears_cursor() {
        let mut cycler = agents();
        cycler.next();
        cycler.reinit(vec!["c", "a", "b"]);
        assert_eq!(cycler.current(), None);
        assert_eq!(*cycler.next(), "c");
        assert_eq!(cycler.tokens(), &["c", "a", "b"]);

        cycler.reinit(Vec::new());
        assert_eq!(cycler.len(), 3);
    }

    #[test]
    fn single_token_is_both_first_and_last() {
        let mut cycler = TurnCycler::new(vec![7_u8]).expect("non-empty");
        assert_eq!(*cycler.next(), 7);
        assert!(cycler.is_first());
        assert!(cycler.is_last());
        assert_eq!(*cycler.next(), 7);
    }
}
