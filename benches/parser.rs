use criterion::{criterion_group, criterion_main, Criterion};

fn parse_datagram(c: &mut Criterion) {
    let rfc5424: &[u8] = b"<165>1 2003-10-11T22:14:15.003Z mymachine.example.com evntslog - ID47 \
        [exampleSDID@32473 iut=\"3\" eventSource=\"Application\" eventID=\"1011\"] \
        An application event log entry...";
    let rfc3164: &[u8] = b"<34>Oct 11 22:14:15 mymachine su: 'su root' failed for lonvick on /dev/pts/8";

    let mut group = c.benchmark_group("parse");

    group.bench_function("rfc5424", |b| {
        b.iter(|| {
            let _ = syslogd::parse_message(rfc5424);
        })
    });

    group.bench_function("rfc3164", |b| {
        b.iter(|| {
            let _ = syslogd::parse_message(rfc3164);
        })
    });

    group.finish();
}

criterion_group!(benches, parse_datagram);
criterion_main!(benches);
