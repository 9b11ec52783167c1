use crate::retriever::{CorpusResults, RetrievalContext};

/// Merges per-corpus results into one labeled grounding block.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    priority: Vec<String>,
}

impl ContextAssembler {
    /// `priority` lists corpus names in the order their blocks appear.
    /// Corpora it does not name follow, in retrieval order.
    pub fn new(priority: Vec<String>) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    /// Render the grounding context, or `None` if no corpus has results.
    ///
    /// Each non-empty corpus becomes a `"{label} Context:"` line followed by
    /// one `Section {number} - {title}: {description}` line per result.
    /// Blocks are separated by a blank line.
    ///
    /// # Examples
    ///
    /// ```
    /// use vajra::{ContextAssembler, Entry, RetrievalContext, SearchResult};
    /// use vajra::retriever::CorpusResults;
    ///
    /// let ctx = RetrievalContext::new(vec![CorpusResults {
    ///     corpus: "bns".into(),
    ///     label: "BNS".into(),
    ///     results: vec![SearchResult {
    ///         entry: Entry {
    ///             section_number: "303".into(),
    ///             section_title: "Theft".into(),
    ///             description: "Taking property dishonestly.".into(),
    ///         },
    ///         relevance_score: 0.12,
    ///     }],
    /// }]);
    ///
    /// let text = ContextAssembler::default().assemble(&ctx).unwrap();
    /// assert_eq!(text, "BNS Context:\nSection 303 - Theft: Taking property dishonestly.");
    /// ```
    pub fn assemble(&self, context: &RetrievalContext) -> Option<String> {
        let blocks: Vec<String> = self
            .ordered(context)
            .into_iter()
            .filter(|g| !g.results.is_empty())
            .map(render_block)
            .collect();

        if blocks.is_empty() {
            None
        } else {
            Some(blocks.join("\n\n"))
        }
    }

    fn ordered<'a>(&self, context: &'a RetrievalContext) -> Vec<&'a CorpusResults> {
        let groups = context.groups();
        let mut ordered: Vec<&CorpusResults> = self
            .priority
            .iter()
            .filter_map(|name| groups.iter().find(|g| &g.corpus == name))
            .collect();
        ordered.extend(
            groups
                .iter()
                .filter(|g| !self.priority.contains(&g.corpus)),
        );
        ordered
    }
}

fn render_block(group: &CorpusResults) -> String {
    let mut block = format!("{} Context:", group.label);
    for result in &group.results {
        block.push('\n');
        block.push_str(&result.entry.context_line());
    }
    block
}
