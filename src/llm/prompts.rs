use crate::types::{ReviewOutput, ReviewRole, ReviewTask, Severity};

/// Fixed prompt catalog for the review crew. One system prompt per role,
/// plus the task messages that embed the diff (reviewers) or the three
/// labeled reviews (summarizer).
pub struct ReviewPrompts;

const SYNTAX_SYSTEM_PROMPT: &str = r#"You are a professional code syntax and style reviewer. Your review scope is strictly limited to:
1. Code formatting: indentation, spacing, line breaks, comment conventions
2. Naming: whether variables, functions, types and constants follow the language's conventions
3. Syntax errors: undefined variables, type mismatches, malformed constructs
4. Language features: idiomatic use of the language, avoiding anti-patterns

Review requirements:
- Tag every finding with a severity (Critical/High/Medium/Low)
- Give a concrete fix suggestion with a code example
- Stay within syntax and style; do not comment on logic, security or performance
- Review only the provided diff; do not assume code you cannot see

Output format: Markdown, clearly structured."#;

const SECURITY_SYSTEM_PROMPT: &str = r#"You are a professional code logic and security reviewer. Your review scope is strictly limited to:
1. Business-logic flaws: boundary conditions, unhandled failure paths, incorrect branching
2. Security risks: SQL injection, XSS, privilege escalation, leaked secrets, plaintext credentials
3. Resource safety: memory leaks, unreleased file handles, unclosed connection pools
4. Access control: strictness of permission checks, least-privilege violations

Review requirements:
- Tag every finding with a severity (Critical/High/Medium/Low)
- Give a concrete remediation with a code example
- Stay within logic and security; do not comment on style or performance
- Review only the provided diff; do not assume code you cannot see

Output format: Markdown, clearly structured."#;

const PERFORMANCE_SYSTEM_PROMPT: &str = r#"You are a professional code performance reviewer. Your review scope is strictly limited to:
1. Loop efficiency: unnecessary loops, deep nesting, expensive operations inside loops
2. Resource usage: memory footprint, CPU cost, network request volume
3. Algorithmic complexity: time and space complexity of the changed code
4. Caching: missed caching opportunities, repeated computation

Review requirements:
- Tag every finding with a severity (Critical/High/Medium/Low)
- Give a concrete optimization with a code example and the expected gain
- Stay within performance; do not comment on style or security
- Review only the provided diff; do not assume code you cannot see

Output format: Markdown, clearly structured."#;

const SUMMARY_SYSTEM_PROMPT: &str = r#"You are a code review report editor. Your only responsibilities are to:
1. Collect every finding from the syntax, security and performance reviewers
2. Group all findings by severity (Critical/High/Medium/Low)
3. Keep each reviewer's original suggestion and add actionable follow-up steps
4. Produce a structured, readable final report containing:
   - a review overview (finding count, severity distribution)
   - the findings grouped by severity
   - prioritized fix recommendations
   - an overall code quality score (1-10)

Output format: Markdown, short sections, key points first."#;

impl ReviewPrompts {
    pub fn syntax(diff: &str) -> ReviewTask {
        ReviewTask {
            role: ReviewRole::Syntax,
            system_prompt: SYNTAX_SYSTEM_PROMPT.to_string(),
            user_message: format!(
                "Review the following code diff for syntax and style issues only:\n\n\
                 ```diff\n{diff}\n```\n\n\
                 Check every added or modified line. For each finding report the severity \
                 ({scale}), the affected line, and a concrete fix with a code example. \
                 Do not step outside your mandate.",
                diff = diff,
                scale = severity_scale(),
            ),
        }
    }

    pub fn security(diff: &str) -> ReviewTask {
        ReviewTask {
            role: ReviewRole::Security,
            system_prompt: SECURITY_SYSTEM_PROMPT.to_string(),
            user_message: format!(
                "Review the following code diff for logic and security issues only:\n\n\
                 ```diff\n{diff}\n```\n\n\
                 Focus on the risks introduced by added or modified lines. For each finding \
                 report the severity ({scale}), the risk category (e.g. SQL injection, \
                 privilege escalation), and a concrete remediation with a code example. \
                 Do not step outside your mandate.",
                diff = diff,
                scale = severity_scale(),
            ),
        }
    }

    pub fn performance(diff: &str) -> ReviewTask {
        ReviewTask {
            role: ReviewRole::Performance,
            system_prompt: PERFORMANCE_SYSTEM_PROMPT.to_string(),
            user_message: format!(
                "Review the following code diff for performance issues only:\n\n\
                 ```diff\n{diff}\n```\n\n\
                 Analyze the bottlenecks the change introduces. For each finding report the \
                 severity ({scale}), the performance impact (complexity, resource cost), and \
                 a concrete optimization with a code example and expected gain. \
                 Do not step outside your mandate.",
                diff = diff,
                scale = severity_scale(),
            ),
        }
    }

    /// Build the fan-in task. Requires all three reviewer outputs; each is
    /// embedded verbatim under its role label, in reviewer order.
    pub fn summary(reviews: &[ReviewOutput; 3]) -> ReviewTask {
        let mut sections = String::new();
        for (index, review) in reviews.iter().enumerate() {
            sections.push_str(&format!(
                "{number}. {label} comments:\n{text}\n\n",
                number = index + 1,
                label = section_label(review.role),
                text = review.full_text,
            ));
        }

        ReviewTask {
            role: ReviewRole::Summary,
            system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
            user_message: format!(
                "Merge the following three reviewers' comments into the final code review \
                 report:\n\n{sections}\
                 Final report requirements:\n\
                 - Order all findings by severity ({scale})\n\
                 - For each finding include the description, severity, affected scope and \
                 fix recommendation\n\
                 - Add a review summary and fix-priority guidance\n\
                 - Give an overall code quality score from 1 to 10\n\
                 - Use clearly structured, readable Markdown",
                sections = sections,
                scale = severity_scale(),
            ),
        }
    }
}

fn section_label(role: ReviewRole) -> &'static str {
    match role {
        ReviewRole::Syntax => "Syntax and style review",
        ReviewRole::Security => "Logic and security review",
        ReviewRole::Performance => "Performance review",
        ReviewRole::Summary => "Summary",
    }
}

fn severity_scale() -> String {
    Severity::ALL
        .iter()
        .map(|severity| severity.to_string())
        .collect::<Vec<_>>()
        .join("/")
}
