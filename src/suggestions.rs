/// Suggested questions for the current episode, with a keyboard cursor.
#[derive(Debug, Clone, Default)]
pub struct SuggestionList {
    questions: Vec<String>,
    selected: usize,
}

impl SuggestionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every displayed suggestion.
    pub fn render(&mut self, questions: Vec<String>) {
        self.questions = questions
            .into_iter()
            .map(|question| question.trim().to_string())
            .filter(|question| !question.is_empty())
            .collect();
        self.selected = 0;
    }

    pub fn clear(&mut self) {
        self.questions.clear();
        self.selected = 0;
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.questions.get(index).map(String::as_str)
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_question(&self) -> Option<&str> {
        self.get(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.questions.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.questions.len() - 1;
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }
}
