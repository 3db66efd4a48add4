//! Fixed texts exchanged with the model and shown in the transcript.

/// Replaces the model placeholder when a streamed reply fails.
pub const FAILURE_REPLY: &str = "Oops! Something went wrong while trying to answer.";

/// Prefix of the single transcript entry of a session whose chat could not be opened.
pub const CONFIGURATION_ERROR_REPLY: &str =
    "Sorry, I am having trouble connecting to my brain right now. Please check the API key and restart.";

/// System instruction scoping the model to the uploaded document.
///
/// The document text is embedded verbatim between the start and end markers.
pub fn system_instruction(content: &str) -> String {
    format!(
        "You are a helpful assistant and an expert on the book provided below. \
         Your task is to answer the user's questions based *only* on the content of this book. \
         Do not use any external knowledge or make assumptions beyond what is written. \
         If the answer is not in the book, say so. Here is the book's content: \
         \n\n---START OF BOOK---\n\n{content}\n\n---END OF BOOK---"
    )
}

/// First model entry of a successfully opened session.
pub fn greeting(title: &str) -> String {
    format!("I've finished reading \"{title}\". What would you like to know?")
}

/// Input placeholder while chatting about `title`.
pub fn input_placeholder(title: &str) -> String {
    format!("Ask a question about \"{title}\"...")
}
