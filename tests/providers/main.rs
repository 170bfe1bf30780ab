mod openai_test;
