//! SURVEYOR/RESPONDENT semantics: broadcast, deadline, stale responses.

use std::thread;
use std::time::Duration;

use spaceframe::{Context, Message, Protocol, SocketOption, SpaceframeError};

fn settle() {
    thread::sleep(Duration::from_millis(80));
}

fn test_ctx() -> Context {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Context::new().unwrap()
}

#[test]
fn survey_collects_until_the_deadline() {
    let ctx = test_ctx();
    let surveyor = ctx.socket(Protocol::Surveyor).unwrap();
    surveyor
        .set_option(SocketOption::SurveyDeadline(Duration::from_millis(400)))
        .unwrap();
    surveyor.bind("inproc://vote").unwrap();

    let r1 = ctx.socket(Protocol::Respondent).unwrap();
    r1.connect("inproc://vote").unwrap();
    let r2 = ctx.socket(Protocol::Respondent).unwrap();
    r2.connect("inproc://vote").unwrap();
    let r3 = ctx.socket(Protocol::Respondent).unwrap();
    r3.connect("inproc://vote").unwrap();
    settle();

    surveyor.send(Message::from("how-goes-it")).unwrap();

    // Two respondents answer promptly; the third stays silent.
    assert_eq!(r1.recv().unwrap().body().as_ref(), b"how-goes-it");
    r1.send(Message::from("r1:fine")).unwrap();
    assert_eq!(r2.recv().unwrap().body().as_ref(), b"how-goes-it");
    r2.send(Message::from("r2:fine")).unwrap();

    let mut answers = vec![
        surveyor.recv().unwrap().body().to_vec(),
        surveyor.recv().unwrap().body().to_vec(),
    ];
    answers.sort();
    assert_eq!(answers, vec![b"r1:fine".to_vec(), b"r2:fine".to_vec()]);

    // Past the deadline the survey is over.
    thread::sleep(Duration::from_millis(500));
    assert!(matches!(surveyor.recv(), Err(SpaceframeError::TimedOut)));

    // A straggler's answer is discarded, not delivered.
    assert_eq!(r3.recv().unwrap().body().as_ref(), b"how-goes-it");
    r3.send(Message::from("r3:late")).unwrap();
    settle();
    assert!(matches!(surveyor.recv(), Err(SpaceframeError::TimedOut)));

    ctx.terminate().unwrap();
}

#[test]
fn survey_state_machine_misuse() {
    let ctx = test_ctx();
    let surveyor = ctx.socket(Protocol::Surveyor).unwrap();
    surveyor.bind("inproc://early").unwrap();
    let respondent = ctx.socket(Protocol::Respondent).unwrap();
    respondent.connect("inproc://early").unwrap();

    assert!(matches!(
        surveyor.recv(),
        Err(SpaceframeError::BadState(_))
    ));
    assert!(matches!(
        respondent.send(Message::from("unprompted")),
        Err(SpaceframeError::BadState(_))
    ));

    ctx.terminate().unwrap();
}

#[test]
fn a_new_survey_discards_stale_answers() {
    let ctx = test_ctx();
    let surveyor = ctx.socket(Protocol::Surveyor).unwrap();
    surveyor
        .set_option(SocketOption::SurveyDeadline(Duration::from_secs(5)))
        .unwrap();
    surveyor.bind("inproc://rounds").unwrap();
    let respondent = ctx.socket(Protocol::Respondent).unwrap();
    respondent.connect("inproc://rounds").unwrap();
    settle();

    surveyor.send(Message::from("round-1")).unwrap();
    assert_eq!(respondent.recv().unwrap().body().as_ref(), b"round-1");

    // The surveyor opens a new round before reading the answer.
    surveyor.send(Message::from("round-2")).unwrap();
    respondent.send(Message::from("answer-1")).unwrap();

    assert_eq!(respondent.recv().unwrap().body().as_ref(), b"round-2");
    respondent.send(Message::from("answer-2")).unwrap();

    // Only the current round's answer surfaces.
    assert_eq!(surveyor.recv().unwrap().body().as_ref(), b"answer-2");

    ctx.terminate().unwrap();
}

#[test]
fn raw_survey_exposes_the_envelope() {
    let ctx = test_ctx();
    let xsurveyor = ctx.socket(Protocol::XSurveyor).unwrap();
    xsurveyor.bind("inproc://rawvote").unwrap();
    let xrespondent = ctx.socket(Protocol::XRespondent).unwrap();
    xrespondent.connect("inproc://rawvote").unwrap();
    settle();

    let mut survey = Message::from("raw-question");
    survey.push_header_word(0x8000_1234);
    xsurveyor.send(survey).unwrap();

    let mut seen = xrespondent.recv().unwrap();
    assert_eq!(seen.header_word_count(), 2);
    let route = seen.pop_header_word().unwrap();
    assert_eq!(seen.pop_header_word(), Some(0x8000_1234));

    let mut response = Message::from("raw-answer");
    response.push_header_word(0x8000_1234);
    response.push_header_word(route);
    xrespondent.send(response).unwrap();

    let mut back = xsurveyor.recv().unwrap();
    assert_eq!(back.pop_header_word(), Some(0x8000_1234));
    assert_eq!(back.body().as_ref(), b"raw-answer");

    ctx.terminate().unwrap();
}
