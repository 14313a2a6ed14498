//! Prompts sent to the inference backends.
//!
//! The response-format block doubles as documentation of the JSON shape the
//! models are asked for; [`crate::feedback::FeedbackReport`] tolerates drift
//! from it.

/// Default system prompt for the primary (structured chat) method.
pub const REVIEWER_SYSTEM_PROMPT: &str = r#"You are an expert in ATS (Applicant Tracking Systems) and résumé analysis.
You are shown an image of the first page of a candidate's résumé.
Review it against the job it is submitted for. Be honest and specific:
if the résumé is weak, give low scores and say why."#;

/// JSON shape the model is asked to return.
pub const RESPONSE_FORMAT: &str = r#"interface Feedback {
  overallScore: number; // 0-100
  ATS: {
    score: number; // rate based on ATS suitability
    tips: {
      type: "good" | "improve";
      tip: string; // 3-4 guidelines
    }[];
  };
  toneAndStyle: {
    score: number; // 0-100
    tips: {
      type: "good" | "improve";
      tip: string; // short title for the tip
      explanation: string; // detailed explanation
    }[]; // 3-4 tips
  };
  content: { score: number; tips: { type: "good" | "improve"; tip: string; explanation: string }[] };
  structure: { score: number; tips: { type: "good" | "improve"; tip: string; explanation: string }[] };
  skills: { score: number; tips: { type: "good" | "improve"; tip: string; explanation: string }[] };
}"#;

/// Build the instruction text for one submission.
///
/// Only the role is described; the company name stays on the record.
pub fn prepare_instructions(job_title: &str, job_description: &str) -> String {
    format!(
        "Please analyze and rate this résumé and suggest how to improve it.\n\
         The rating can be low if the résumé is bad.\n\
         Be thorough and detailed. Don't be afraid to point out mistakes or areas for improvement.\n\
         If provided, take the job description into consideration.\n\
         The job title is: {job_title}\n\
         The job description is: {job_description}\n\
         Provide the feedback using the following format:\n\
         {RESPONSE_FORMAT}\n\
         Return the analysis as a JSON object, without any other text and without backticks.\n\
         Do not include any other text or comments."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_embed_job_context_and_format() {
        let text = prepare_instructions("Engineer", "Build pipelines in Rust");
        assert!(text.contains("The job title is: Engineer"));
        assert!(text.contains("Build pipelines in Rust"));
        assert!(text.contains("interface Feedback"));
        assert!(text.contains("without backticks"));
    }
}
