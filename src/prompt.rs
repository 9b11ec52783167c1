//! The fixed instruction template wrapped around every grounded question.
//!
//! Persona, scope, formatting, disclaimer and language rules are baked in
//! here; only the corpus list, the retrieved context and the question vary.

use std::fmt::Write;

pub const PERSONA: &str = "You are VAJRA (Virtual Assistant for Justice, Rights, and Accountability),\na legal assistant trained on:";

/// Emergency numbers offered for urgent queries.
pub const HELPLINES: &[(&str, &str)] = &[
    ("Police / Emergency", "100"),
    ("Women's Helpline", "1091"),
    ("NCW WhatsApp", "7827170170"),
    ("Childline", "1098"),
    ("Cyber Crime Helpline", "1930"),
    ("Legal Aid (NALSA)", "15100"),
    ("Ambulance", "102 or 108"),
];

/// A corpus as the persona introduces it.
#[derive(Debug, Clone, Copy)]
pub struct Source<'a> {
    pub label: &'a str,
    pub title: &'a str,
}

/// Build the full generation prompt.
pub fn build_prompt(sources: &[Source<'_>], context: &str, query: &str) -> String {
    let labels: Vec<&str> = sources.iter().map(|s| s.label).collect();
    let label_list = join_alternatives(&labels);

    let mut prompt = String::new();
    prompt.push_str(PERSONA);
    prompt.push('\n');
    for source in sources {
        let _ = writeln!(prompt, "- {} ({})", source.title, source.label);
    }

    let _ = write!(
        prompt,
        "\nContext from law databases:\n{context}\n\nUser Question: {query}\n\nInstructions:\n"
    );

    let rules = [
        "Always answer in plain text (no bold, no markdown, use bullet points if necessary).".to_string(),
        format!("Mention section numbers and specify whether they belong to {label_list}."),
        "Explain legal concepts in clear, simple language with examples if helpful.".to_string(),
        "If the question is outside these laws, state that clearly.".to_string(),
        "Always remind the user this is general information only and they should consult a qualified lawyer.".to_string(),
    ];
    for rule in &rules {
        let _ = writeln!(prompt, "- {rule}");
    }

    prompt.push_str(
        "- If the query is urgent, provide the most relevant helpline numbers:\n",
    );
    for (name, number) in HELPLINES {
        let _ = writeln!(prompt, "  {name}: {number}");
    }

    for rule in [
        "Handle queries in multiple languages and respond in the same language as the question.",
        "Provide comparative insights where relevant (old IPC/CrPC/Evidence Act vs new BNS/BNSS/BSA).",
        "Provide historical context and reasons for introduction of new laws.",
        "Handle hypothetical scenarios, always with the disclaimer this is not legal advice.",
        "Recognize and respond to queries about related legal concepts (Constitution, SC judgments, etc).",
        "Mention implementation status of the new laws and public debates if relevant.",
    ] {
        let _ = writeln!(prompt, "- {rule}");
    }

    prompt.push_str("\nAnswer:");
    prompt
}

/// "A", "A or B", "A, B, or C".
fn join_alternatives(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [one] => (*one).to_string(),
        [a, b] => format!("{a} or {b}"),
        [rest @ .., last] => format!("{}, or {last}", rest.join(", ")),
    }
}
