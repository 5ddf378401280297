//! Prompt builders for the classroom collaborator calls.

/// System + user prompt pair.
pub struct Prompt {
    pub system: String,
    pub user: String,
}

fn subject_section(subject: Option<&str>) -> String {
    match subject {
        Some(s) if !s.trim().is_empty() => format!("The course is {}.\n", s.trim()),
        _ => String::new(),
    }
}

/// Rewrite a raw student question: fix typos and grammar, keep intent.
pub fn clean_question(question: &str, has_capture: bool, subject: Option<&str>) -> Prompt {
    let system = format!(
        "You refine questions written by students during a live lecture.\n\
         Fix typos, grammar mistakes and filler while keeping the original \
         intent, and make the question clear and concise.\n\
         {}If a capture of the instructor's slide is provided, use it to pin \
         down the context of the question.",
        subject_section(subject)
    );

    let user = if has_capture {
        format!(
            "Refine this student question, using the attached slide capture \
             for context:\n\n{question}\n\nReturn only the refined question, \
             with no extra commentary."
        )
    } else {
        format!(
            "Refine this student question:\n\n{question}\n\nReturn only the \
             refined question, with no extra commentary."
        )
    };

    Prompt { system, user }
}

/// Answer a (cleaned) question as a teaching assistant.
pub fn answer_question(question: &str, has_capture: bool, subject: Option<&str>) -> Prompt {
    let system = format!(
        "You are a teaching assistant answering a student's question during \
         a live lecture.\n{}Give a short, correct explanation a student can \
         read in under a minute. Prefer concrete examples over formalism.",
        subject_section(subject)
    );

    let user = if has_capture {
        format!(
            "Answer this question, using the attached slide capture for \
             context:\n\n{question}"
        )
    } else {
        format!("Answer this question:\n\n{question}")
    };

    Prompt { system, user }
}

/// One-line summary of an instructor slide capture.
pub fn summarize_capture(subject: Option<&str>) -> Prompt {
    let system = format!(
        "You summarize a captured lecture slide the instructor marked as \
         important.\n{}Describe what the slide covers in a single short line.",
        subject_section(subject)
    );

    let user = "Summarize the attached slide capture in one line. Return only \
                the summary."
        .to_string();

    Prompt { system, user }
}
