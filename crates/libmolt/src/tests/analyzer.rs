//! Diagnostics and inference behavior of the semantic analyzer.

use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::error::DiagnosticKind;

use super::{compile_err, error_kinds};

#[test]
fn missing_parameter_annotation_is_fatal() {
    let kinds = error_kinds("def f(x) -> int:\n    return 1\n\ndef main() -> None:\n    pass\n");
    assert!(kinds.contains(&DiagnosticKind::MissingAnnotation));
}

#[test]
fn missing_return_annotation_is_fatal() {
    let kinds = error_kinds("def f(x: int):\n    return x\n\ndef main() -> None:\n    pass\n");
    assert!(kinds.contains(&DiagnosticKind::MissingAnnotation));
}

#[rstest]
#[case("def main() -> None:\n    x = None\n")]
#[case("def main() -> None:\n    x = []\n")]
#[case("def main() -> None:\n    x = {}\n")]
fn ambiguous_locals_need_annotations(#[case] code: &str) {
    let kinds = error_kinds(code);
    assert!(kinds.contains(&DiagnosticKind::UninferableLocal), "kinds were {kinds:?}");
}

#[test]
fn annotated_empty_containers_are_fine() {
    super::compile_one("def main() -> None:\n    xs: list[int] = []\n    print(len(xs))\n");
}

#[test]
fn unknown_name_is_reported() {
    let kinds = error_kinds("def main() -> None:\n    print(missing)\n");
    assert_eq!(kinds, vec![DiagnosticKind::UnknownSymbol]);
}

#[test]
fn unknown_callable_mentions_stubs() {
    let report = compile_err("def main() -> None:\n    not_a_function(1)\n");
    let diagnostic = report.iter().next().unwrap();
    assert_eq!(diagnostic.kind, DiagnosticKind::UnknownSymbol);
    assert!(diagnostic.notes.iter().any(|note| note.contains("stub")));
}

#[rstest]
#[case("def main() -> None:\n    x: int = 1 + \"two\"\n")]
#[case("def main() -> None:\n    if 1:\n        pass\n")]
#[case("def f() -> int:\n    return \"nope\"\n\ndef main() -> None:\n    pass\n")]
#[case("def f(x: int) -> int:\n    return x\n\ndef main() -> None:\n    y: int = f(\"s\")\n")]
fn type_mismatches_are_reported(#[case] code: &str) {
    let kinds = error_kinds(code);
    assert!(kinds.contains(&DiagnosticKind::TypeMismatch), "kinds were {kinds:?}");
}

#[rstest]
#[case("async def nap() -> None:\n    pass\n\ndef main() -> None:\n    await nap()\n")]
#[case("async def nap() -> None:\n    pass\n\ndef main() -> None:\n    nap()\n")]
#[case("async def nap() -> None:\n    pass\n\nasync def main() -> None:\n    nap()\n")]
fn await_discipline(#[case] code: &str) {
    let kinds = error_kinds(code);
    assert!(kinds.contains(&DiagnosticKind::AwaitOutsideAsync), "kinds were {kinds:?}");
}

#[test]
fn inheritance_is_rejected() {
    let kinds = error_kinds(
        "class Base:\n    pass\n\nclass Child(Base):\n    pass\n\ndef main() -> None:\n    pass\n",
    );
    assert!(kinds.contains(&DiagnosticKind::UnsupportedConstruct));
}

#[test]
fn module_level_mutable_state_is_rejected() {
    let kinds = error_kinds("CACHE: list[int] = []\n\ndef main() -> None:\n    pass\n");
    assert!(kinds.contains(&DiagnosticKind::UnsupportedConstruct));
}

#[test]
fn stray_top_level_statements_are_rejected() {
    let kinds = error_kinds("def main() -> None:\n    pass\n\nprint(\"boot\")\n");
    assert!(kinds.contains(&DiagnosticKind::UnsupportedConstruct));
}

#[test]
fn asyncio_run_idiom_is_deleted() {
    let text = super::entry_text(
        "import asyncio\n\nasync def main() -> None:\n    print(\"hi\")\n\nasyncio.run(main())\n",
    );
    assert!(!text.contains("asyncio"), "emitted:\n{text}");
    assert!(text.contains("#[tokio::main]"));
}

#[test]
fn parameter_defaults_are_rejected_outside_dataclasses() {
    let kinds = error_kinds("def f(x: int = 3) -> int:\n    return x\n\ndef main() -> None:\n    pass\n");
    assert!(kinds.contains(&DiagnosticKind::UnsupportedConstruct));
}

#[test]
fn analysis_collects_multiple_diagnostics_in_one_run() {
    let kinds = error_kinds(
        "def main() -> None:\n    a: int = \"one\"\n    print(missing)\n    b = None\n",
    );
    assert!(kinds.len() >= 3, "kinds were {kinds:?}");
    assert!(kinds.contains(&DiagnosticKind::TypeMismatch));
    assert!(kinds.contains(&DiagnosticKind::UnknownSymbol));
    assert!(kinds.contains(&DiagnosticKind::UninferableLocal));
}

#[test]
fn bare_find_is_rejected() {
    let kinds = error_kinds("def main() -> None:\n    text: str = \"abc\"\n    pos: int = text.find(\"b\")\n");
    assert!(kinds.contains(&DiagnosticKind::UnsupportedConstruct), "kinds were {kinds:?}");
}

#[test]
fn chained_fallible_binding_requires_compatible_error() {
    // the callee's error type does not match, so no propagation applies and
    // the annotated binding cannot hold the Result
    let kinds = error_kinds(
        "def might_fail() -> Result[int, int]:\n    return Ok(1)\n\ndef caller() -> Result[int, str]:\n    value: int = might_fail()\n    return Ok(value)\n\ndef main() -> None:\n    pass\n",
    );
    assert!(kinds.contains(&DiagnosticKind::TypeMismatch), "kinds were {kinds:?}");
}

#[test]
fn conditional_with_none_branch_is_optional() {
    super::compile_one(
        "def pick(flag: bool) -> Optional[int]:\n    return 1 if flag else None\n\ndef main() -> None:\n    print(pick(True) is None)\n",
    );
}

#[test]
fn scoped_resource_must_be_stubbed() {
    let kinds = error_kinds("def main() -> None:\n    with open(\"f\") as handle:\n        pass\n");
    assert!(
        kinds.contains(&DiagnosticKind::UnsupportedConstruct) || kinds.contains(&DiagnosticKind::UnknownSymbol),
        "kinds were {kinds:?}"
    );
}
