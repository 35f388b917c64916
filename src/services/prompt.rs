use crate::models::book::{Book, Tag};

const RESPONSE_RULE: &str = "Respond with the JSON object only, no other text.";

fn sorted_by_id(books: &[Book]) -> Vec<&Book> {
    let mut sorted: Vec<&Book> = books.iter().collect();
    // sort_by_key is stable, so books sharing an id keep their input order
    sorted.sort_by_key(|book| book.id);
    sorted
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    // Plain structs of strings and integers always serialize.
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

/// Builds the free-form tagging prompt. The output depends only on the set of
/// books once they are ordered by id.
pub fn build_prompt(books: &[Book]) -> String {
    let books_json = to_json(&sorted_by_id(books));

    format!(
        r#"Given the following array of books:
Books:
{books_json}

Each book is defined by an id, a title and an author. Analyze the content, themes, genre and topics associated with each book. Based on this analysis, return a single JSON object where each book title is a key and the corresponding value is an array of tag strings that best describe the book's content and themes.

Example: {{"Dune": ["science fiction", "politics", "ecology"]}}

{RESPONSE_RULE}"#
    )
}

/// Builds the vocabulary-constrained prompt: the model picks tag ids from `tags`.
pub fn build_vocabulary_prompt(books: &[Book], tags: &[Tag]) -> String {
    let books_json = to_json(&sorted_by_id(books));
    let tags_json = to_json(tags);

    format!(
        r#"Given the following array of books and array of tags:
Books:
{books_json}

Tags:
{tags_json}

Each book is defined by an id, a title and an author. Analyze the content, themes, genre and topics associated with each book. Based on this analysis, return a single JSON object where each book title is a key and the corresponding value is an array of the ids of the tags that best describe the book's content and themes. Only use ids from the predefined list of tags, given in the format {{"id": int, "tag": string}}. Add the fiction tag if the genre is fiction.

Example: {{"Dune": [3, 12]}}

{RESPONSE_RULE}"#
    )
}
