//! Emission contracts: ownership decoration, rewrites, attributes, and the
//! quantified properties that are checkable on single programs.

use pretty_assertions::assert_eq;
use rstest::rstest;

use super::{compile_one, entry_text};

#[test]
fn mutability_is_emitted_only_when_needed() {
    let text = entry_text(
        "def main() -> None:\n    counter: int = 0\n    fixed: int = 7\n    counter = counter + fixed\n    print(counter)\n",
    );
    assert!(text.contains("let mut counter: i64 = 0;"), "emitted:\n{text}");
    assert!(text.contains("let fixed: i64 = 7;"), "emitted:\n{text}");
}

#[test]
fn mutating_methods_make_locals_mutable() {
    let text = entry_text(
        "def main() -> None:\n    items: list[int] = []\n    items.append(3)\n    print(len(items))\n",
    );
    assert!(text.contains("let mut items: Vec<i64> = vec![];"), "emitted:\n{text}");
    assert!(text.contains("items.push(3);"), "emitted:\n{text}");
}

#[test]
fn reassigned_parameters_become_mut() {
    let text = entry_text(
        "def bump(x: int) -> int:\n    x = x + 1\n    return x\n\ndef main() -> None:\n    print(bump(1))\n",
    );
    assert!(text.contains("pub fn bump(mut x: i64) -> i64 {"), "emitted:\n{text}");
}

#[rstest]
#[case("key in items", "items.contains(&key)")]
#[case("key not in items", "!items.contains(&key)")]
fn membership_rewrites(#[case] source_expr: &str, #[case] expected: &str) {
    let code = format!(
        "def main() -> None:\n    items: list[str] = [\"a\"]\n    key: str = \"a\"\n    print({source_expr})\n"
    );
    let text = entry_text(&code);
    assert!(text.contains(expected), "emitted:\n{text}");
}

#[test]
fn mapping_membership_uses_contains_key() {
    let text = entry_text(
        "def main() -> None:\n    counts: dict[str, int] = {\"a\": 1}\n    print(\"a\" in counts)\n",
    );
    assert!(text.contains("counts.contains_key(\"a\")"), "emitted:\n{text}");
}

#[rstest]
#[case("text.find(\"x\") >= 0", "text.contains(\"x\")")]
#[case("text.find(\"x\") != -1", "text.contains(\"x\")")]
#[case("text.find(\"x\") == -1", "!text.contains(\"x\")")]
#[case("text.find(\"x\") < 0", "!text.contains(\"x\")")]
fn find_sentinel_rewrites(#[case] source_expr: &str, #[case] expected: &str) {
    let code = format!("def main() -> None:\n    text: str = \"xyz\"\n    print({source_expr})\n");
    let text = entry_text(&code);
    assert!(text.contains(expected), "emitted:\n{text}");
}

#[test]
fn format_specifiers_are_preserved() {
    let text = entry_text("def main() -> None:\n    count: int = 5\n    print(f\"[{count:>3}]\")\n");
    assert!(text.contains("println!(\"[{:>3}]\", count);"), "emitted:\n{text}");
}

#[test]
fn fstring_in_expression_position_uses_format() {
    let text = entry_text(
        "def label(n: int) -> str:\n    return f\"item {n}\"\n\ndef main() -> None:\n    print(label(1))\n",
    );
    assert!(text.contains("format!(\"item {}\", n)"), "emitted:\n{text}");
}

#[rstest]
#[case("line.upper()", ".to_uppercase()")]
#[case("line.lower()", ".to_lowercase()")]
#[case("line.strip()", ".trim().to_string()")]
#[case("line.startswith(\"#\")", ".starts_with(\"#\")")]
#[case("line.endswith(\";\")", ".ends_with(\";\")")]
#[case("line.isdigit()", ".chars().all(|c| c.is_ascii_digit())")]
#[case("line.replace(\"a\", \"b\")", ".replace(\"a\", \"b\")")]
fn string_method_table(#[case] source_expr: &str, #[case] expected: &str) {
    let code = format!("def main() -> None:\n    line: str = \"text\"\n    print({source_expr})\n");
    let text = entry_text(&code);
    assert!(text.contains(expected), "emitted:\n{text}");
}

#[test]
fn split_collects_owned_strings() {
    let text = entry_text(
        "def main() -> None:\n    line: str = \"a,b\"\n    parts: list[str] = line.split(\",\")\n    print(len(parts))\n",
    );
    assert!(
        text.contains("line.split(\",\").map(|part| part.to_string()).collect::<Vec<String>>()"),
        "emitted:\n{text}"
    );
}

#[test]
fn join_flips_receiver_and_argument() {
    let text = entry_text(
        "def main() -> None:\n    parts: list[str] = [\"a\", \"b\"]\n    print(\", \".join(parts))\n",
    );
    assert!(text.contains("parts.join(\", \")"), "emitted:\n{text}");
}

#[test]
fn dataclass_emits_struct_and_constructor() {
    let text = entry_text(
        "@dataclass\nclass Point:\n    x: float\n    y: float\n    label: str = \"origin\"\n\ndef main() -> None:\n    p: Point = Point(1.0, 2.0)\n    print(p.x)\n",
    );
    assert!(text.contains("#[derive(Debug, Clone)]"), "emitted:\n{text}");
    assert!(text.contains("pub struct Point {"), "emitted:\n{text}");
    assert!(text.contains("pub x: f64,"), "emitted:\n{text}");
    assert!(
        text.contains("pub fn new(x: f64, y: f64, label: Option<String>) -> Self {"),
        "emitted:\n{text}"
    );
    assert!(
        text.contains("label: label.unwrap_or(\"origin\".to_string())"),
        "emitted:\n{text}"
    );
    // omitted defaulted argument pads with None
    assert!(text.contains("Point::new(1.0, 2.0, None)"), "emitted:\n{text}");
}

#[test]
fn init_class_gets_new_and_receiver_forms() {
    let text = entry_text(
        "class Counter:\n    count: int\n    def __init__(self, start: int) -> None:\n        self.count = start\n    def bump(self) -> None:\n        self.count = self.count + 1\n    def value(self) -> int:\n        return self.count\n\ndef main() -> None:\n    c: Counter = Counter(0)\n    c.bump()\n    print(c.value())\n",
    );
    assert!(text.contains("pub fn new(start: i64) -> Self {"), "emitted:\n{text}");
    assert!(text.contains("Self { count: start }"), "emitted:\n{text}");
    assert!(text.contains("pub fn bump(&mut self) {"), "emitted:\n{text}");
    assert!(text.contains("pub fn value(&self) -> i64 {"), "emitted:\n{text}");
    // calling the mutating method leaves the receiver mutable
    assert!(text.contains("let mut c: Counter = Counter::new(0);"), "emitted:\n{text}");
}

#[test]
fn scoped_resource_becomes_a_block() {
    let project = compile_one(
        "def main() -> None:\n    with TemporaryDirectory() as tmp:\n        print(\"inside\")\n",
    );
    let text = &project.modules[0].text;
    assert!(text.contains("let tmp = tempfile::tempdir()"), "emitted:\n{text}");
    assert!(
        project.requirements.iter().any(|requirement| requirement.crate_name == "tempfile"),
        "requirements were {:?}",
        project.requirements
    );
}

#[test]
fn comprehension_lowers_to_iterator_chain() {
    let text = entry_text(
        "def main() -> None:\n    values: list[int] = [1, 2, 3]\n    doubled: list[int] = [v * 2 for v in values if v > 1]\n    print(len(doubled))\n",
    );
    assert!(
        text.contains("values.iter().cloned().filter_map(|v| if v > 1 { Some(v * 2) } else { None }).collect::<Vec<_>>()"),
        "emitted:\n{text}"
    );
}

#[test]
fn constants_become_statics() {
    let text = entry_text("LIMIT: int = 100\nGREETING: str = \"hello\"\n\ndef main() -> None:\n    print(LIMIT)\n");
    assert!(text.contains("pub static LIMIT: i64 = 100;"), "emitted:\n{text}");
    assert!(text.contains("pub static GREETING: &str = \"hello\";"), "emitted:\n{text}");
}

#[test]
fn emission_is_idempotent() {
    let code = "def main() -> None:\n    values: list[int] = [3, 1]\n    values.sort()\n    print(f\"{values[0]}\")\n";
    let first = compile_one(code);
    let second = compile_one(code);
    assert_eq!(first.modules[0].text, second.modules[0].text);
    assert_eq!(first.manifest(), second.manifest());
}

#[test]
fn shared_and_guarded_render_canonically() {
    let text = entry_text(
        "async def main() -> None:\n    state: Arc[Mutex[int]] = Arc(Mutex(0))\n    current: int = await state.lock()\n    print(current)\n",
    );
    assert!(text.contains("use std::sync::Arc;"), "emitted:\n{text}");
    assert!(
        text.contains("let state: Arc<tokio::sync::Mutex<i64>> = Arc::new(tokio::sync::Mutex::new(0));"),
        "emitted:\n{text}"
    );
    assert!(text.contains("state.lock().await"), "emitted:\n{text}");
}

#[test]
fn pass_through_attributes_are_verbatim() {
    let text = entry_text(
        "# #[derive(Debug, Clone, PartialEq)]\n@dataclass\nclass Point:\n    x: float\n\ndef main() -> None:\n    p: Point = Point(1.0)\n    print(p.x)\n",
    );
    assert!(text.contains("#[derive(Debug, Clone, PartialEq)]"), "emitted:\n{text}");
    // the pass-through derive suppresses the default one
    assert!(!text.contains("#[derive(Debug, Clone)]\n#[derive(Debug, Clone, PartialEq)]"));
    let occurrences = text.matches("#[derive").count();
    assert_eq!(occurrences, 1, "emitted:\n{text}");
}

#[test]
fn supplied_entry_attribute_suppresses_tokio_main() {
    let text = entry_text(
        "# #[tokio::main(flavor = \"current_thread\")]\nasync def main() -> None:\n    print(\"hi\")\n",
    );
    assert_eq!(text.matches("#[tokio::main").count(), 1, "emitted:\n{text}");
    assert!(text.contains("flavor = \"current_thread\""), "emitted:\n{text}");
}

#[test]
fn floor_division_on_floats_keeps_flooring() {
    let text = entry_text("def main() -> None:\n    ratio: float = 7.0 // 2.0\n    print(ratio)\n");
    assert!(text.contains("(7.0 / 2.0).floor()"), "emitted:\n{text}");
}

#[test]
fn string_concatenation_borrows_the_right_side() {
    let text = entry_text(
        "def main() -> None:\n    first: str = \"a\"\n    second: str = \"b\"\n    both: str = first + second\n    print(both)\n",
    );
    assert!(text.contains("first + &second"), "emitted:\n{text}");
}
