pub const DEFAULT_CONTEXT_HINT: &str = "classroom";

const PREAMBLE: &str = "You are an AI assistant helping visually impaired students understand \
educational content from classroom lectures. The text below was read off a whiteboard or \
slide with OCR, so it may contain recognition mistakes.";

const INSTRUCTIONS: &str = "Please:
1. Explain the content clearly and simply.
2. If it contains a formula or equation, say what it means and what each symbol stands for.
3. If it is a list or diagram label, describe how the pieces relate.
4. Point out anything that looks like an OCR error and give the likely intended text.
5. Keep the explanation under 200 words and suitable for reading aloud.";

/// Builds the educational prompt for `text` seen in the given context.
pub fn build_prompt(text: &str, context_hint: &str) -> String {
    let context = match context_hint.trim() {
        "" => DEFAULT_CONTEXT_HINT,
        hint => hint,
    };
    format!("{PREAMBLE}\n\nContext: {context}\n\nText:\n\"\"\"\n{text}\n\"\"\"\n\n{INSTRUCTIONS}")
}
